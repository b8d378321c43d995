use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

/// Optional bounds on the number of conversions under the prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CountBounds {
    /// Smallest admissible count.
    #[serde(default)]
    pub lower: usize,
    /// Largest admissible count, unbounded when absent.
    #[serde(default)]
    pub upper: Option<usize>,
}

impl CountBounds {
    /// Whether `count` lies inside the bounds.
    pub fn contains(&self, count: usize) -> bool {
        count >= self.lower && self.upper.map_or(true, |upper| count <= upper)
    }

    /// Whether the bounds restrict anything.
    pub fn is_bounded(&self) -> bool {
        self.lower > 0 || self.upper.is_some()
    }
}

/// Conversion rate and tract length parameters shared by the prior, the
/// sampling primitives and the operators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Conversion rate per site per unit of clonal frame length.
    pub rho: f64,
    /// Mean tract length.
    pub delta: f64,
    /// Bounds on the conversion count.
    #[serde(default)]
    pub count_bounds: CountBounds,
}

impl ModelParams {
    /// Creates unbounded parameters.
    pub fn new(rho: f64, delta: f64) -> Result<Self, AcgError> {
        let params = Self {
            rho,
            delta,
            count_bounds: CountBounds::default(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Adds conversion count bounds.
    pub fn with_count_bounds(mut self, lower: usize, upper: Option<usize>) -> Self {
        self.count_bounds = CountBounds { lower, upper };
        self
    }

    /// Checks that ρ is non-negative and δ is at least one.
    pub fn validate(&self) -> Result<(), AcgError> {
        if !(self.rho.is_finite() && self.rho >= 0.0) {
            return Err(AcgError::Model(
                ErrorInfo::new("invalid-rho", "conversion rate must be finite and non-negative")
                    .with_context("rho", self.rho),
            ));
        }
        if !(self.delta.is_finite() && self.delta >= 1.0) {
            return Err(AcgError::Model(
                ErrorInfo::new("invalid-delta", "mean tract length must be at least one site")
                    .with_context("delta", self.delta),
            ));
        }
        if let Some(upper) = self.count_bounds.upper {
            if upper < self.count_bounds.lower {
                return Err(AcgError::Model(
                    ErrorInfo::new("invalid-bounds", "upper count bound below lower bound")
                        .with_context("lower", self.count_bounds.lower)
                        .with_context("upper", upper),
                ));
            }
        }
        Ok(())
    }
}

/// `n * ln(1 - 1/delta)`, taken as zero when `n == 0` so that `delta == 1`
/// stays finite.
pub(crate) fn tract_extension_log_p(n: usize, delta: f64) -> f64 {
    if n == 0 {
        0.0
    } else {
        n as f64 * (1.0 - 1.0 / delta).ln()
    }
}

/// Total start-site mass of the unrestricted region draw, `Σ (L + δ - 1)`.
pub(crate) fn site_mass(total_sites: usize, loci: usize, delta: f64) -> f64 {
    total_sites as f64 + loci as f64 * (delta - 1.0)
}
