//! Demographic models consumed by the coalescent density and the edge
//! sampling primitives.

use serde::{Deserialize, Serialize};

use crate::errors::{AcgError, ErrorInfo};

/// Population size through time, measured backwards from the present.
///
/// The coalescent machinery only needs the size itself and the cumulative
/// intensity `I(t) = \int_0^t 1/N(s) ds` together with its inverse.
pub trait PopulationFunction: std::fmt::Debug + Send + Sync {
    /// Effective population size at time `t`.
    fn pop_size(&self, t: f64) -> f64;

    /// Cumulative coalescent intensity from 0 to `t`.
    fn intensity(&self, t: f64) -> f64;

    /// Inverse of [`PopulationFunction::intensity`].
    fn inverse_intensity(&self, x: f64) -> f64;

    /// Integral of `1/N(t)` over `[t0, t1]`.
    fn integral(&self, t0: f64, t1: f64) -> f64 {
        self.intensity(t1) - self.intensity(t0)
    }
}

/// Constant population size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantPopulation {
    size: f64,
}

impl ConstantPopulation {
    /// Creates a constant population model. The size must be positive and finite.
    pub fn new(size: f64) -> Result<Self, AcgError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(AcgError::Model(
                ErrorInfo::new("invalid-pop-size", "population size must be positive")
                    .with_context("size", size),
            ));
        }
        Ok(Self { size })
    }

    /// Returns the configured size.
    pub fn size(&self) -> f64 {
        self.size
    }
}

impl PopulationFunction for ConstantPopulation {
    fn pop_size(&self, _t: f64) -> f64 {
        self.size
    }

    fn intensity(&self, t: f64) -> f64 {
        t / self.size
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        x * self.size
    }

    fn integral(&self, t0: f64, t1: f64) -> f64 {
        (t1 - t0) / self.size
    }
}

/// Interpolation used between skyline change points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SkylineShape {
    /// Size is constant within each group.
    #[default]
    PiecewiseConstant,
    /// Size is interpolated linearly between change points.
    PiecewiseLinear,
}

/// Piecewise population function with explicit change times.
///
/// `boundaries[0]` must be `0.0` and the boundaries must be strictly
/// increasing. Beyond the last boundary the final size applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkylinePopulation {
    boundaries: Vec<f64>,
    sizes: Vec<f64>,
    shape: SkylineShape,
    intensities: Vec<f64>,
}

impl SkylinePopulation {
    /// Builds a skyline from change times and sizes of equal length.
    pub fn new(
        boundaries: Vec<f64>,
        sizes: Vec<f64>,
        shape: SkylineShape,
    ) -> Result<Self, AcgError> {
        if boundaries.is_empty() || boundaries.len() != sizes.len() {
            return Err(AcgError::Model(
                ErrorInfo::new(
                    "skyline-shape",
                    "skyline needs one size per change time",
                )
                .with_context("boundaries", boundaries.len())
                .with_context("sizes", sizes.len()),
            ));
        }
        if boundaries[0] != 0.0 || boundaries.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AcgError::Model(
                ErrorInfo::new(
                    "skyline-boundaries",
                    "skyline change times must start at zero and increase",
                )
                .with_hint("merge coincident change times"),
            ));
        }
        if let Some(bad) = sizes.iter().find(|n| !(n.is_finite() && **n > 0.0)) {
            return Err(AcgError::Model(
                ErrorInfo::new("invalid-pop-size", "population size must be positive")
                    .with_context("size", bad),
            ));
        }

        let mut intensities = vec![0.0; boundaries.len()];
        for i in 1..boundaries.len() {
            let width = boundaries[i] - boundaries[i - 1];
            let (n0, n1) = (sizes[i - 1], sizes[i]);
            intensities[i] = intensities[i - 1]
                + match shape {
                    SkylineShape::PiecewiseLinear if n0 != n1 => {
                        width / (n1 - n0) * (n1 / n0).ln()
                    }
                    _ => width / n0,
                };
        }

        Ok(Self {
            boundaries,
            sizes,
            shape,
            intensities,
        })
    }

    /// Change times of the skyline.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Sizes attached to each change time.
    pub fn sizes(&self) -> &[f64] {
        &self.sizes
    }

    fn last(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Index of the boundary at or to the left of `t`.
    fn interval(&self, t: f64) -> usize {
        self.boundaries
            .partition_point(|b| *b <= t)
            .saturating_sub(1)
            .min(self.last())
    }

    fn linear_segment(&self, idx: usize) -> Option<(f64, f64, f64, f64)> {
        if self.shape != SkylineShape::PiecewiseLinear || idx >= self.last() {
            return None;
        }
        Some((
            self.boundaries[idx],
            self.boundaries[idx + 1],
            self.sizes[idx],
            self.sizes[idx + 1],
        ))
    }
}

impl PopulationFunction for SkylinePopulation {
    fn pop_size(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return self.sizes[0];
        }
        let idx = self.interval(t);
        match self.linear_segment(idx) {
            Some((t0, t1, n0, n1)) => n0 + (t - t0) / (t1 - t0) * (n1 - n0),
            None => self.sizes[idx],
        }
    }

    fn intensity(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return t / self.sizes[0];
        }
        let idx = self.interval(t);
        match self.linear_segment(idx) {
            Some((t0, t1, n0, n1)) if n0 != n1 => {
                let n = n0 + (t - t0) / (t1 - t0) * (n1 - n0);
                self.intensities[idx] + (t1 - t0) / (n1 - n0) * (n / n0).ln()
            }
            _ => self.intensities[idx] + (t - self.boundaries[idx]) / self.sizes[idx],
        }
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return x * self.sizes[0];
        }
        let idx = self
            .intensities
            .partition_point(|i| *i <= x)
            .saturating_sub(1)
            .min(self.last());
        match self.linear_segment(idx) {
            Some((t0, t1, n0, n1)) if n0 != n1 => {
                let slope = (n1 - n0) / (t1 - t0);
                t0 + n0 * ((slope * (x - self.intensities[idx])).exp() - 1.0) / slope
            }
            _ => self.boundaries[idx] + (x - self.intensities[idx]) * self.sizes[idx],
        }
    }
}
