//! Forward simulation of conversion graphs from the coalescent priors.
//!
//! The clonal frame is a serially sampled Kingman coalescent. Conversions are
//! then added according to the graph's model: a Poisson number of independent
//! conversions when unrestricted, or a per-locus renewal walk alternating
//! between clonal frame runs and converted tracts when restricted.

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::population::PopulationFunction;
use acg_core::rng::RngHandle;
use acg_graph::{ClonalFrame, ConversionGraph, ConversionModel, Locus, NodeId};

use crate::coalescent::{expected_conversion_count, RegionProcess};
use crate::params::ModelParams;
use crate::sampling::{attach_edge, draw_affected_region, RegionDraw};

/// Simulates a clonal frame for leaves sampled at `leaf_heights`.
///
/// Leaves are labelled `t0`, `t1`, ... in input order.
pub fn simulate_clonal_frame(
    population: &dyn PopulationFunction,
    leaf_heights: &[f64],
    rng: &mut RngHandle,
) -> Result<ClonalFrame, AcgError> {
    if leaf_heights.len() < 2 {
        return Err(AcgError::Model(
            ErrorInfo::new("too-few-leaves", "a clonal frame needs at least two leaves")
                .with_context("leaves", leaf_heights.len()),
        ));
    }
    if let Some(bad) = leaf_heights.iter().find(|h| !(h.is_finite() && **h >= 0.0)) {
        return Err(AcgError::Model(
            ErrorInfo::new("invalid-leaf-height", "leaf heights must be finite and non-negative")
                .with_context("height", bad),
        ));
    }

    let mut samples: Vec<(usize, f64)> = leaf_heights.iter().copied().enumerate().collect();
    samples.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut frame = ClonalFrame::new();
    let ids: Vec<NodeId> = leaf_heights
        .iter()
        .enumerate()
        .map(|(idx, height)| frame.add_leaf(*height, format!("t{idx}")))
        .collect();

    let mut pending = samples.into_iter().peekable();
    let mut active: Vec<NodeId> = Vec::new();
    let mut time = 0.0;
    loop {
        // Admit every sample at or below the current time.
        while let Some((idx, _)) = pending.next_if(|(_, h)| *h <= time) {
            active.push(ids[idx]);
        }
        if active.len() < 2 {
            match pending.next() {
                Some((idx, height)) => {
                    active.push(ids[idx]);
                    time = height;
                    continue;
                }
                None => break,
            }
        }

        let k = active.len() as f64;
        let rate = 0.5 * k * (k - 1.0);
        let target = population.intensity(time) + rng.exponential(1.0) / rate;
        let next_time = population.inverse_intensity(target);
        if let Some((_, next_sample)) = pending.peek() {
            if *next_sample < next_time {
                time = *next_sample;
                continue;
            }
        }

        let first = active.swap_remove(rng.uniform_index(active.len()));
        let second = active.swap_remove(rng.uniform_index(active.len()));
        let parent = frame.join(first, second, next_time)?;
        log::trace!("coalesced {first} and {second} into {parent} at {next_time}");
        active.push(parent);
        time = next_time;
    }
    Ok(frame)
}

/// Adds conversions drawn from the prior of the graph's model to `acg`.
pub fn simulate_conversions(
    acg: &mut ConversionGraph,
    params: &ModelParams,
    population: &dyn PopulationFunction,
    rng: &mut RngHandle,
) -> Result<(), AcgError> {
    match acg.model() {
        ConversionModel::Unrestricted => {
            let count = rng.poisson(expected_conversion_count(acg, params));
            for _ in 0..count {
                let (edge, _) = attach_edge(acg, population, rng)?;
                let (region, _) = draw_affected_region(acg, params.delta, rng);
                acg.add_conversion(edge.into_conversion(region))?;
            }
        }
        ConversionModel::Restricted => {
            for locus in 0..acg.loci().len() {
                for region in restricted_regions(acg, params, locus, rng)? {
                    let (edge, _) = attach_edge(acg, population, rng)?;
                    acg.add_conversion(edge.into_conversion(region))?;
                }
            }
        }
    }
    log::debug!("simulated {} conversions", acg.conversion_count());
    Ok(())
}

/// Walks `locus` site by site, alternating clonal frame runs that end with
/// probability `alpha` per site and tracts that end with probability `1/δ`.
fn restricted_regions(
    acg: &ConversionGraph,
    params: &ModelParams,
    locus: usize,
    rng: &mut RngHandle,
) -> Result<Vec<RegionDraw>, AcgError> {
    let Some(locus_def) = acg.locus(locus) else {
        return Ok(Vec::new());
    };
    let last = locus_def.last_site();
    let process = RegionProcess::for_locus(acg, params, locus_def.site_count());
    if !(process.alpha < 1.0) {
        return Err(AcgError::Model(
            ErrorInfo::new("region-process", "clonal frame run ends with probability above one")
                .with_context("locus", locus)
                .with_context("alpha", process.alpha)
                .with_hint("lower rho or use the unrestricted model"),
        ));
    }
    let mut regions = Vec::new();
    let mut start = if rng.uniform() < process.p_start_cf {
        (rng.geometric(process.alpha) as usize).saturating_add(1)
    } else {
        0
    };
    while start <= last {
        let end = start
            .saturating_add(rng.geometric(process.delta_inv) as usize)
            .min(last);
        regions.push(RegionDraw { locus, start, end });
        if end == last {
            break;
        }
        start = (rng.geometric(process.alpha) as usize).saturating_add(end + 2);
    }
    Ok(regions)
}

/// Simulates a complete conversion graph: a clonal frame for the given
/// leaves, then conversions under `model`.
pub fn simulate_acg(
    params: &ModelParams,
    population: &dyn PopulationFunction,
    leaf_heights: &[f64],
    loci: Vec<Locus>,
    model: ConversionModel,
    rng: &mut RngHandle,
) -> Result<ConversionGraph, AcgError> {
    params.validate()?;
    let frame = simulate_clonal_frame(population, leaf_heights, rng)?;
    let mut acg = ConversionGraph::new(frame, loci, model)?;
    simulate_conversions(&mut acg, params, population, rng)?;
    Ok(acg)
}
