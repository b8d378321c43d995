#![deny(missing_docs)]
#![doc = "Coalescent priors, proposal distributions and Metropolis-Hastings operators over ancestral conversion graphs, together with forward simulation and a prior-only sampling kernel driven by YAML configuration."]

/// Checkpoint payloads and file layout.
pub mod checkpoint;
/// Coalescent prior densities.
pub mod coalescent;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Prior-only sampling kernel and public `run`/`resume` entry points.
pub mod kernel;
/// Graph-edit operators.
pub mod operators;
/// Model parameters shared by the prior and the operators.
pub mod params;
/// Edge and region proposal distributions.
pub mod sampling;
/// Forward simulation from the priors.
pub mod simulate;

pub use checkpoint::{checkpoint_path, CheckpointPayload};
pub use coalescent::{
    clonal_frame_log_p, converted_region_map_log_p, expected_conversion_count, recombinant_log_p,
    AcgCoalescent, CoalescentModel, GcCoalescentApprox, RegionProcess,
};
pub use config::{
    CheckpointConfig, ModelConfig, OperatorConfig, OperatorTuning, OperatorWeights,
    PopulationConfig, RunConfig, SeedPolicy,
};
pub use kernel::{build_operators, log_prior, prior_for, resume, run, AcceptanceStats, RunSummary};
pub use operators::{Operator, ProposalContext};
pub use params::{CountBounds, ModelParams};
pub use simulate::{simulate_acg, simulate_clonal_frame, simulate_conversions};
