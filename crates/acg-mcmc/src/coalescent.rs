//! Coalescent priors over conversion graphs.

use acg_core::population::PopulationFunction;
use acg_graph::{CfEventKind, Conversion, ConversionGraph};

use crate::params::{site_mass, tract_extension_log_p, ModelParams};
use crate::sampling::{affected_region_prob, edge_attachment_prob};

/// Log prior density of a conversion graph.
pub trait CoalescentModel {
    /// Log density of `acg` under the model; `-inf` for impossible graphs.
    fn log_p(&self, acg: &ConversionGraph, population: &dyn PopulationFunction) -> f64;
}

/// Kingman coalescent density of the clonal frame alone.
pub fn clonal_frame_log_p(acg: &ConversionGraph, population: &dyn PopulationFunction) -> f64 {
    let events = acg.cf_events().events();
    let mut log_p = 0.0;
    for pair in events.windows(2) {
        let k = pair[0].lineages as f64;
        log_p -= 0.5 * k * (k - 1.0) * population.integral(pair[0].height, pair[1].height);
        if pair[1].kind == CfEventKind::Coalescence {
            log_p -= population.pop_size(pair[1].height).ln();
        }
    }
    log_p
}

/// Density of a conversion's edge given the clonal frame: uniform departure
/// on the frame and coalescent arrival.
pub fn recombinant_log_p(
    acg: &ConversionGraph,
    population: &dyn PopulationFunction,
    conv: &Conversion,
) -> f64 {
    edge_attachment_prob(acg, population, conv)
}

/// Expected conversion count of the unrestricted model, `ρ · L_cf · α`.
pub fn expected_conversion_count(acg: &ConversionGraph, params: &ModelParams) -> f64 {
    params.rho
        * acg.clonal_frame_length()
        * site_mass(acg.total_sites(), acg.loci().len(), params.delta)
}

fn poisson_log_pmf(n: usize, mean: f64) -> f64 {
    let log_factorial: f64 = (2..=n).map(|k| (k as f64).ln()).sum();
    if mean == 0.0 {
        return if n == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    -mean + n as f64 * mean.ln() - log_factorial
}

fn log_sum_exp(terms: impl Iterator<Item = f64>) -> f64 {
    let terms: Vec<f64> = terms.collect();
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// `ln P(lower <= N <= upper)` for `N ~ Poisson(mean)`.
pub(crate) fn poisson_log_mass(mean: f64, lower: usize, upper: Option<usize>) -> f64 {
    match upper {
        Some(upper) => log_sum_exp((lower..=upper).map(|n| poisson_log_pmf(n, mean))),
        None if lower == 0 => 0.0,
        None => {
            let below = log_sum_exp((0..lower).map(|n| poisson_log_pmf(n, mean)));
            if below >= 0.0 {
                f64::NEG_INFINITY
            } else {
                (-below.exp()).ln_1p()
            }
        }
    }
}

/// Coalescent with gene conversion under the unrestricted model: a Poisson
/// number of conversions with independent edges and regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcgCoalescent {
    params: ModelParams,
}

impl AcgCoalescent {
    /// Creates the model.
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    /// Model parameters.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }
}

impl CoalescentModel for AcgCoalescent {
    fn log_p(&self, acg: &ConversionGraph, population: &dyn PopulationFunction) -> f64 {
        let count = acg.conversion_count();
        let bounds = self.params.count_bounds;
        if !bounds.contains(count) {
            return f64::NEG_INFINITY;
        }

        let mut log_p = clonal_frame_log_p(acg, population);

        let mean = expected_conversion_count(acg, &self.params);
        if mean == 0.0 {
            if count > 0 {
                return f64::NEG_INFINITY;
            }
        } else {
            log_p += -mean + count as f64 * mean.ln();
        }

        for conv in acg.all_conversions() {
            log_p += recombinant_log_p(acg, population, conv)
                + affected_region_prob(acg, self.params.delta, conv);
        }

        if bounds.is_bounded() {
            log_p -= poisson_log_mass(mean, bounds.lower, bounds.upper);
        }
        log_p
    }
}

/// Restricted-model approximation: conversion edges are independent and
/// the converted regions of each locus follow a two-state renewal process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcCoalescentApprox {
    params: ModelParams,
}

impl GcCoalescentApprox {
    /// Creates the model.
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    /// Model parameters.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }
}

impl CoalescentModel for GcCoalescentApprox {
    fn log_p(&self, acg: &ConversionGraph, population: &dyn PopulationFunction) -> f64 {
        let mut log_p = clonal_frame_log_p(acg, population);
        for conv in acg.all_conversions() {
            log_p += recombinant_log_p(acg, population, conv);
        }
        for locus in 0..acg.loci().len() {
            log_p += converted_region_map_log_p(acg, &self.params, locus);
        }
        log_p
    }
}

/// Per-site switching rates of the restricted region process for a locus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionProcess {
    /// Probability that a clonal frame run ends at a given site.
    pub alpha: f64,
    /// Probability that a tract ends at a given site.
    pub delta_inv: f64,
    /// Probability that the locus starts under the clonal frame.
    pub p_start_cf: f64,
}

impl RegionProcess {
    /// Rates for a locus of `site_count` sites.
    pub fn for_locus(acg: &ConversionGraph, params: &ModelParams, site_count: usize) -> Self {
        let alpha = 0.5 * params.rho * acg.clonal_frame_length() / site_count as f64;
        let delta_inv = 1.0 / params.delta;
        Self {
            alpha,
            delta_inv,
            p_start_cf: 1.0 / (alpha / delta_inv + 1.0),
        }
    }
}

fn run_log_p(n: usize, p_stop: f64) -> f64 {
    if n == 0 {
        0.0
    } else {
        n as f64 * (1.0 - p_stop).ln()
    }
}

/// Log probability of the converted-region layout of `locus` under the
/// renewal process of [`RegionProcess`].
pub fn converted_region_map_log_p(acg: &ConversionGraph, params: &ModelParams, locus: usize) -> f64 {
    let Some(locus_def) = acg.locus(locus) else {
        return f64::NEG_INFINITY;
    };
    let last = locus_def.last_site();
    let process = RegionProcess::for_locus(acg, params, locus_def.site_count());
    let RegionProcess {
        alpha,
        delta_inv,
        p_start_cf,
    } = process;
    if !(alpha < 1.0) {
        return f64::NEG_INFINITY;
    }

    let conversions = acg.conversions(locus);
    let Some(first) = conversions.first() else {
        return p_start_cf.ln() + run_log_p(last, alpha);
    };
    if alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let mut log_p = if first.start() > 0 {
        p_start_cf.ln() + run_log_p(first.start() - 1, alpha)
    } else {
        (1.0 - p_start_cf).ln() - alpha.ln()
    };

    for (idx, conv) in conversions.iter().enumerate() {
        log_p += alpha.ln() + tract_extension_log_p(conv.end() - conv.start(), params.delta);
        match conversions.get(idx + 1) {
            Some(next) => {
                let Some(gap) = next.start().checked_sub(conv.end() + 2) else {
                    return f64::NEG_INFINITY;
                };
                log_p += delta_inv.ln() + run_log_p(gap, alpha);
            }
            None if conv.end() < last => {
                log_p += delta_inv.ln() + run_log_p(last - conv.end() - 1, alpha);
            }
            None => {}
        }
    }
    log_p
}
