use std::path::{Path, PathBuf};

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::population::PopulationFunction;
use acg_core::rng::RngHandle;
use acg_graph::{canonical_hash, ConversionGraph, ConversionModel, GraphRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{checkpoint_path, CheckpointPayload};
use crate::coalescent::{AcgCoalescent, CoalescentModel, GcCoalescentApprox};
use crate::config::{OperatorConfig, RunConfig};
use crate::determinism;
use crate::operators::{
    AcgScaler, AddRemoveConversion, AddRemoveDetour, AddRemoveRedundantConversion, CfUniform,
    CfWilsonBalding, ClonalFrameConversionSwap, ConvertedEdgeFlip, ConvertedEdgeHop,
    ConvertedEdgeSlide, ConvertedRegionBoundaryShift, ConvertedRegionShift, MergeSplitConversion,
    Operator, PairBoundaryShift, ProposalContext, ReplaceConversion,
};
use crate::params::ModelParams;

/// Proposal and acceptance counts of one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceStats {
    /// Proposals made.
    pub proposed: usize,
    /// Proposals accepted.
    pub accepted: usize,
}

impl AcceptanceStats {
    fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Fraction of proposals accepted, zero before the first proposal.
    pub fn rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

/// Summary returned to callers after a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Step index the run started from.
    pub start_step: usize,
    /// Total number of steps completed, including any before a resume.
    pub steps: usize,
    /// Per-operator counts, in registration order.
    pub acceptance: IndexMap<String, AcceptanceStats>,
    /// Conversion count sampled every `sample_interval` steps.
    pub conversion_counts: Vec<usize>,
    /// Log prior of the final state.
    pub final_log_p: f64,
    /// Canonical hash of the final state.
    pub final_graph_hash: String,
    /// Final state of the chain.
    pub final_graph: GraphRecord,
    /// Checkpoint files still on disk at the end of the run.
    pub checkpoints: Vec<PathBuf>,
}

impl RunSummary {
    /// Mean of the sampled conversion counts.
    pub fn mean_conversion_count(&self) -> f64 {
        if self.conversion_counts.is_empty() {
            return 0.0;
        }
        self.conversion_counts.iter().sum::<usize>() as f64 / self.conversion_counts.len() as f64
    }
}

/// Prior density matching the graph's conversion model.
pub fn prior_for(model: ConversionModel, params: ModelParams) -> Box<dyn CoalescentModel> {
    match model {
        ConversionModel::Unrestricted => Box::new(AcgCoalescent::new(params)),
        ConversionModel::Restricted => Box::new(GcCoalescentApprox::new(params)),
    }
}

/// Operators with a positive weight, in registration order.
pub fn build_operators(config: &OperatorConfig) -> Vec<(Box<dyn Operator>, f64)> {
    let tuning = &config.tuning;
    let weights = &config.weights;
    let registry: Vec<(Box<dyn Operator>, f64)> = vec![
        (Box::new(AddRemoveConversion::new()), weights.add_remove),
        (
            Box::new(CfUniform::new(tuning.scale_factor).with_root(tuning.include_root)),
            weights.cf_uniform,
        ),
        (
            Box::new(CfWilsonBalding::new(tuning.wb_alpha)),
            weights.cf_wilson_balding,
        ),
        (
            Box::new(MergeSplitConversion::new(tuning.expected_gap)),
            weights.merge_split,
        ),
        (Box::new(ClonalFrameConversionSwap::new()), weights.cf_swap),
        (
            Box::new(ConvertedRegionShift::new(tuning.aperture)),
            weights.region_shift,
        ),
        (
            Box::new(ConvertedRegionBoundaryShift::new(tuning.aperture)),
            weights.boundary_shift,
        ),
        (Box::new(PairBoundaryShift::new()), weights.pair_boundary_shift),
        (Box::new(AddRemoveDetour::new()), weights.detour),
        (
            Box::new(ConvertedEdgeSlide::new(tuning.height_window)),
            weights.edge_slide,
        ),
        (Box::new(ConvertedEdgeHop::new()), weights.edge_hop),
        (Box::new(ConvertedEdgeFlip::new()), weights.edge_flip),
        (
            Box::new(ReplaceConversion::new(tuning.expected_gap)),
            weights.replace,
        ),
        (
            Box::new(AddRemoveRedundantConversion::new(tuning.height_window)),
            weights.redundant,
        ),
        (
            Box::new(AcgScaler::new(tuning.scale_factor).with_root_only(tuning.scale_root_only)),
            weights.scaler,
        ),
    ];
    registry.into_iter().filter(|(_, w)| *w > 0.0).collect()
}

/// Runs the prior-only sampler from `initial` with the provided configuration.
pub fn run(config: &RunConfig, initial: &ConversionGraph) -> Result<RunSummary, AcgError> {
    config.validate()?;
    run_from(config, config.seed_policy.master_seed, initial.clone(), 0)
}

/// Resumes a run from a checkpoint file.
pub fn resume(path: &Path) -> Result<RunSummary, AcgError> {
    let payload = CheckpointPayload::load(path)?;
    payload.config.validate()?;
    let acg = payload.restore_graph()?;
    log::debug!(
        "resuming from {} at step {} (written {})",
        path.display(),
        payload.step,
        payload.created_at
    );
    run_from(&payload.config, payload.master_seed, acg, payload.step)
}

fn run_from(
    config: &RunConfig,
    seed: u64,
    mut acg: ConversionGraph,
    start_step: usize,
) -> Result<RunSummary, AcgError> {
    if acg.model() != config.model.conversion_model
        || acg.whole_locus_mode() != config.model.whole_locus_mode
    {
        return Err(AcgError::Config(
            ErrorInfo::new("model-mismatch", "initial graph does not match the configured model")
                .with_context("graph", format!("{:?}", acg.model()))
                .with_context("config", format!("{:?}", config.model.conversion_model)),
        ));
    }
    acg.validate()?;

    let params = config.model.params()?;
    let population = config.population.build()?;
    let prior = prior_for(acg.model(), params);
    let ctx = ProposalContext::new(population.as_ref(), params);

    let mut log_p = prior.log_p(&acg, population.as_ref());
    if !log_p.is_finite() {
        return Err(AcgError::Model(
            ErrorInfo::new("impossible-start", "initial graph has zero prior density")
                .with_context("log_p", log_p),
        ));
    }

    let mut operators = build_operators(&config.operators);
    let weights: Vec<f64> = operators.iter().map(|(_, w)| *w).collect();
    let mut acceptance: IndexMap<String, AcceptanceStats> = operators
        .iter()
        .map(|(op, _)| (op.name().to_string(), AcceptanceStats::default()))
        .collect();

    let mut conversion_counts = Vec::new();
    let mut checkpoints = Vec::new();
    for step in start_step..config.steps {
        let mut rng = RngHandle::from_seed(determinism::step_seed(seed, step));
        let Some(slot) = rng.weighted_index(&weights) else {
            return Err(AcgError::Config(ErrorInfo::new(
                "no-operators",
                "no operator has a positive weight",
            )));
        };
        let mut proposal_rng = RngHandle::from_seed(determinism::operator_seed(seed, step, slot));
        let (operator, _) = &mut operators[slot];

        let snapshot = acg.clone();
        let log_hr = operator
            .proposal(&mut acg, &ctx, &mut proposal_rng)
            .map_err(|err| err.with_context("step", step).with_context("operator", operator.name()))?;
        let accepted = if log_hr == f64::NEG_INFINITY {
            false
        } else {
            let candidate = prior.log_p(&acg, population.as_ref());
            let log_alpha = candidate - log_p + log_hr;
            let accepted = rng.log_uniform() < log_alpha;
            if accepted {
                log_p = candidate;
            }
            accepted
        };
        if !accepted {
            acg = snapshot;
        }
        log::trace!("step {step}: {} accepted={accepted}", operator.name());
        if let Some(stats) = acceptance.get_mut(operator.name()) {
            stats.record(accepted);
        }

        let completed = step + 1;
        if completed % config.sample_interval == 0 {
            conversion_counts.push(acg.conversion_count());
        }
        if config.checkpoint.interval > 0 && completed % config.checkpoint.interval == 0 {
            if let Some(dir) = &config.checkpoint.directory {
                let path = checkpoint_path(dir, completed);
                CheckpointPayload::new(completed, config, seed, &acg, log_p).store(&path)?;
                checkpoints.push(path);
                enforce_checkpoint_retention(&mut checkpoints, config.checkpoint.max_to_keep)?;
            }
        }
    }

    for (name, stats) in &acceptance {
        log::debug!(
            "{name}: {}/{} accepted ({:.3})",
            stats.accepted,
            stats.proposed,
            stats.rate()
        );
    }
    Ok(RunSummary {
        start_step,
        steps: config.steps.max(start_step),
        acceptance,
        conversion_counts,
        final_log_p: log_p,
        final_graph_hash: canonical_hash(&acg),
        final_graph: GraphRecord::from_graph(&acg),
        checkpoints,
    })
}

fn enforce_checkpoint_retention(
    paths: &mut Vec<PathBuf>,
    max_to_keep: usize,
) -> Result<(), AcgError> {
    while paths.len() > max_to_keep {
        let path = paths.remove(0);
        std::fs::remove_file(&path).map_err(|err| {
            AcgError::Serde(
                ErrorInfo::new("checkpoint-remove", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
    }
    Ok(())
}

/// Log prior of `acg` under the configured model and population.
pub fn log_prior(config: &RunConfig, acg: &ConversionGraph) -> Result<f64, AcgError> {
    let params = config.model.params()?;
    let population: Box<dyn PopulationFunction> = config.population.build()?;
    Ok(prior_for(acg.model(), params).log_p(acg, population.as_ref()))
}
