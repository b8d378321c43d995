use std::fs;
use std::path::{Path, PathBuf};

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::population::{ConstantPopulation, PopulationFunction, SkylinePopulation, SkylineShape};
use acg_graph::ConversionModel;
use serde::{Deserialize, Serialize};

use crate::params::{CountBounds, ModelParams};

/// YAML-configurable parameters governing a sampler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of proposals to execute.
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Interval in steps at which the conversion count is sampled.
    #[serde(default = "default_sample_interval")]
    pub sample_interval: usize,
    /// Coalescent model parameters.
    #[serde(default)]
    pub model: ModelConfig,
    /// Population function.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Operator weights and tuning.
    #[serde(default)]
    pub operators: OperatorConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

fn default_steps() -> usize {
    1_000
}

fn default_sample_interval() -> usize {
    10
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            sample_interval: default_sample_interval(),
            model: ModelConfig::default(),
            population: PopulationConfig::default(),
            operators: OperatorConfig::default(),
            seed_policy: SeedPolicy::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

fn config_error(code: &str, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new(code, message)
}

impl RunConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, AcgError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|err| AcgError::Config(config_error("config-parse", err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load(path: &Path) -> Result<Self, AcgError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            AcgError::Config(
                config_error("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, AcgError> {
        serde_yaml::to_string(self)
            .map_err(|err| AcgError::Config(config_error("config-serialize", err.to_string())))
    }

    /// Checks every field for values the sampler cannot run with.
    pub fn validate(&self) -> Result<(), AcgError> {
        if self.steps == 0 {
            return Err(AcgError::Config(
                config_error("invalid-steps", "a run needs at least one step")
                    .with_context("steps", self.steps),
            ));
        }
        if self.sample_interval == 0 {
            return Err(AcgError::Config(
                config_error("invalid-sample-interval", "sample interval must be positive")
                    .with_hint("use 1 to sample after every step"),
            ));
        }
        self.model.params()?;
        self.population.build()?;
        self.operators.validate()
    }
}

/// Model section of the run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Conversion rate per site per unit of clonal frame length.
    #[serde(default = "default_rho")]
    pub rho: f64,
    /// Mean tract length.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Restricted or unrestricted conversion model.
    #[serde(default)]
    pub conversion_model: ConversionModel,
    /// Whether every conversion spans a whole locus.
    #[serde(default)]
    pub whole_locus_mode: bool,
    /// Bounds on the number of conversions.
    #[serde(default)]
    pub count_bounds: CountBounds,
}

fn default_rho() -> f64 {
    0.01
}

fn default_delta() -> f64 {
    50.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            rho: default_rho(),
            delta: default_delta(),
            conversion_model: ConversionModel::default(),
            whole_locus_mode: false,
            count_bounds: CountBounds::default(),
        }
    }
}

impl ModelConfig {
    /// Validated model parameters.
    pub fn params(&self) -> Result<ModelParams, AcgError> {
        let params = ModelParams::new(self.rho, self.delta)
            .map(|p| p.with_count_bounds(self.count_bounds.lower, self.count_bounds.upper))
            .and_then(|p| p.validate().map(|()| p));
        params.map_err(|err| AcgError::Config(err.info().clone()))
    }
}

/// Population function section of the run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PopulationConfig {
    /// Constant effective population size.
    Constant {
        /// Population size.
        #[serde(default = "default_pop_size")]
        size: f64,
    },
    /// Piecewise population function.
    Skyline {
        /// Change times, starting at zero.
        boundaries: Vec<f64>,
        /// Size at each change time.
        sizes: Vec<f64>,
        /// Interpolation between change times.
        #[serde(default)]
        shape: SkylineShape,
    },
}

fn default_pop_size() -> f64 {
    1.0
}

impl Default for PopulationConfig {
    fn default() -> Self {
        PopulationConfig::Constant {
            size: default_pop_size(),
        }
    }
}

impl PopulationConfig {
    /// Builds the configured population function.
    pub fn build(&self) -> Result<Box<dyn PopulationFunction>, AcgError> {
        let built: Result<Box<dyn PopulationFunction>, AcgError> = match self {
            PopulationConfig::Constant { size } => {
                ConstantPopulation::new(*size).map(|p| Box::new(p) as Box<dyn PopulationFunction>)
            }
            PopulationConfig::Skyline {
                boundaries,
                sizes,
                shape,
            } => SkylinePopulation::new(boundaries.clone(), sizes.clone(), *shape)
                .map(|p| Box::new(p) as Box<dyn PopulationFunction>),
        };
        built.map_err(|err| AcgError::Config(err.info().clone()))
    }
}

/// Relative selection weight of each operator. A zero weight disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorWeights {
    /// Conversion birth/death.
    #[serde(default = "default_weight")]
    pub add_remove: f64,
    /// Clonal frame node height move.
    #[serde(default = "default_weight")]
    pub cf_uniform: f64,
    /// Clonal frame subtree prune-and-regraft.
    #[serde(default = "default_weight")]
    pub cf_wilson_balding: f64,
    /// Conversion split/merge.
    #[serde(default = "default_weight")]
    pub merge_split: f64,
    /// Clonal frame / conversion exchange.
    #[serde(default = "default_weight")]
    pub cf_swap: f64,
    /// Whole-region shift.
    #[serde(default = "default_weight")]
    pub region_shift: f64,
    /// Single-boundary shift.
    #[serde(default = "default_weight")]
    pub boundary_shift: f64,
    /// Neighbouring-pair boundary shift.
    #[serde(default = "default_weight")]
    pub pair_boundary_shift: f64,
    /// Detour birth/death.
    #[serde(default = "default_weight")]
    pub detour: f64,
    /// Conversion endpoint height slide.
    #[serde(default = "default_weight")]
    pub edge_slide: f64,
    /// Conversion endpoint hop between contemporary edges.
    #[serde(default = "default_weight")]
    pub edge_hop: f64,
    /// Departure/arrival edge exchange.
    #[serde(default = "default_weight")]
    pub edge_flip: f64,
    /// Gap cut/fuse with a fresh edge.
    #[serde(default = "default_weight")]
    pub replace: f64,
    /// Redundant conversion birth/death.
    #[serde(default = "default_weight")]
    pub redundant: f64,
    /// Whole-graph height scaling.
    #[serde(default = "default_weight")]
    pub scaler: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for OperatorWeights {
    fn default() -> Self {
        Self {
            add_remove: default_weight(),
            cf_uniform: default_weight(),
            cf_wilson_balding: default_weight(),
            merge_split: default_weight(),
            cf_swap: default_weight(),
            region_shift: default_weight(),
            boundary_shift: default_weight(),
            pair_boundary_shift: default_weight(),
            detour: default_weight(),
            edge_slide: default_weight(),
            edge_hop: default_weight(),
            edge_flip: default_weight(),
            replace: default_weight(),
            redundant: default_weight(),
            scaler: default_weight(),
        }
    }
}

impl OperatorWeights {
    /// Weights keyed by operator name, in registration order.
    pub fn named(&self) -> [(&'static str, f64); 15] {
        [
            ("add-remove-conversion", self.add_remove),
            ("cf-uniform", self.cf_uniform),
            ("cf-wilson-balding", self.cf_wilson_balding),
            ("merge-split-conversion", self.merge_split),
            ("cf-conversion-swap", self.cf_swap),
            ("converted-region-shift", self.region_shift),
            ("converted-region-boundary-shift", self.boundary_shift),
            ("pair-boundary-shift", self.pair_boundary_shift),
            ("add-remove-detour", self.detour),
            ("converted-edge-slide", self.edge_slide),
            ("converted-edge-hop", self.edge_hop),
            ("converted-edge-flip", self.edge_flip),
            ("replace-conversion", self.replace),
            ("add-remove-redundant-conversion", self.redundant),
            ("acg-scaler", self.scaler),
        ]
    }
}

/// Operator tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorTuning {
    /// Root scale factor of the clonal frame height move.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// Whether the height move may rescale the root.
    #[serde(default = "default_include_root")]
    pub include_root: bool,
    /// Mean of the new root height above its floor, relative to the floor.
    #[serde(default = "default_wb_alpha")]
    pub wb_alpha: f64,
    /// Fraction of the locus spanned by the region shift window.
    #[serde(default = "default_aperture")]
    pub aperture: f64,
    /// Mean gap left between the pieces of a restricted split.
    #[serde(default = "default_expected_gap")]
    pub expected_gap: f64,
    /// Endpoint slide width and redundant-conversion window, relative to the
    /// root height.
    #[serde(default = "default_height_window")]
    pub height_window: f64,
    /// Whether the graph scaler only moves the root and the edges meeting it.
    #[serde(default)]
    pub scale_root_only: bool,
}

fn default_scale_factor() -> f64 {
    0.8
}

fn default_include_root() -> bool {
    true
}

fn default_wb_alpha() -> f64 {
    0.1
}

fn default_aperture() -> f64 {
    0.01
}

fn default_expected_gap() -> f64 {
    10.0
}

fn default_height_window() -> f64 {
    0.1
}

impl Default for OperatorTuning {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
            include_root: default_include_root(),
            wb_alpha: default_wb_alpha(),
            aperture: default_aperture(),
            expected_gap: default_expected_gap(),
            height_window: default_height_window(),
            scale_root_only: false,
        }
    }
}

/// Operator section of the run configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Selection weights.
    #[serde(default)]
    pub weights: OperatorWeights,
    /// Tuning parameters.
    #[serde(default)]
    pub tuning: OperatorTuning,
}

impl OperatorConfig {
    /// Rejects negative weights, an all-zero weight vector and out-of-range
    /// tuning values.
    pub fn validate(&self) -> Result<(), AcgError> {
        let named = self.weights.named();
        if let Some((name, weight)) = named.iter().find(|(_, w)| !(w.is_finite() && *w >= 0.0)) {
            return Err(AcgError::Config(
                config_error("invalid-weight", "operator weights must be finite and non-negative")
                    .with_context("operator", name)
                    .with_context("weight", weight),
            ));
        }
        if named.iter().all(|(_, w)| *w == 0.0) {
            return Err(AcgError::Config(
                config_error("no-operators", "every operator weight is zero")
                    .with_hint("give at least one operator a positive weight"),
            ));
        }

        let tuning = &self.tuning;
        let checks = [
            (
                "scale_factor",
                tuning.scale_factor,
                tuning.scale_factor > 0.0 && tuning.scale_factor != 1.0,
            ),
            ("wb_alpha", tuning.wb_alpha, tuning.wb_alpha > 0.0),
            (
                "aperture",
                tuning.aperture,
                tuning.aperture > 0.0 && tuning.aperture <= 1.0,
            ),
            ("expected_gap", tuning.expected_gap, tuning.expected_gap >= 1.0),
            ("height_window", tuning.height_window, tuning.height_window > 0.0),
        ];
        for (field, value, ok) in checks {
            if !(ok && value.is_finite()) {
                return Err(AcgError::Config(
                    config_error("invalid-tuning", "operator tuning value out of range")
                        .with_context("field", field)
                        .with_context("value", value),
                ));
            }
        }
        Ok(())
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Interval in steps between checkpoint writes (0 disables checkpoints).
    #[serde(default)]
    pub interval: usize,
    /// Directory where checkpoints are stored.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Maximum number of checkpoints to retain.
    #[serde(default = "default_checkpoint_retention")]
    pub max_to_keep: usize,
}

fn default_checkpoint_retention() -> usize {
    4
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            directory: None,
            max_to_keep: default_checkpoint_retention(),
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded alongside the seed.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}
