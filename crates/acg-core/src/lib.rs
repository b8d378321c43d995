#![deny(missing_docs)]
#![doc = "Core contracts for the ancestral conversion graph sampler: the shared error surface, the injected random number handle and the population functions consumed by the coalescent model."]

pub mod errors;
pub mod population;
pub mod rng;

pub use errors::{AcgError, ErrorInfo};
pub use population::{ConstantPopulation, PopulationFunction, SkylinePopulation, SkylineShape};
pub use rng::{derive_substream_seed, RngHandle};

/// Natural log of one half, the weight of each independent child reassignment.
pub const LOG_HALF: f64 = -std::f64::consts::LN_2;
