//! Conversion bookkeeping shared by the clonal frame operators: the Poisson
//! creation and removal of conversions departing from a volatile stretch of
//! the frame, and the collapse/expand transfer of endpoints between a moved
//! lineage and the lineage it rejoins.

use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{reattach, Conversion, ConversionGraph, ConversionId, NodeId};

use super::{endpoints_where, Endpoint, ProposalContext};
use crate::params::site_mass;
use crate::sampling::{
    affected_region_prob, coalesce_edge, draw_affected_region, edge_coalescence_prob,
};

/// Stretch of a clonal frame edge on which departures may be created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    pub node: NodeId,
    pub lower: f64,
    pub upper: f64,
}

impl Segment {
    fn length(&self) -> f64 {
        (self.upper - self.lower).max(0.0)
    }

    fn holds(&self, node: NodeId, height: f64) -> bool {
        node == self.node && height > self.lower && height <= self.upper
    }
}

fn creation_mean(acg: &ConversionGraph, ctx: &ProposalContext<'_>, area: f64) -> f64 {
    ctx.rho() * area * site_mass(acg.total_sites(), acg.loci().len(), ctx.delta())
}

/// Density of an ordered sequence of `n` Poisson-counted draws, without the
/// `1/n!` that the ordering cancels.
fn ordered_poisson_log_p(n: usize, mean: f64) -> f64 {
    match n {
        0 => -mean,
        _ if mean > 0.0 => -mean + n as f64 * mean.ln(),
        _ => f64::NEG_INFINITY,
    }
}

/// Deletes every conversion departing from one of `segments` and returns the
/// log density with which [`create_departures`] would have produced them.
///
/// Departures elsewhere are kept even when they lie above a segment's lower
/// bound, as on the edges below a pruned subtree that reaches past the
/// remnant root.
pub(crate) fn remove_departures(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    segments: &[Segment],
) -> Result<f64, AcgError> {
    let area: f64 = segments.iter().map(Segment::length).sum();
    let doomed: Vec<ConversionId> = acg
        .all_conversions()
        .filter(|c| segments.iter().any(|s| s.holds(c.node1, c.height1)))
        .map(|c| c.id())
        .collect();
    if !doomed.is_empty() && !(area > 0.0) {
        return Ok(f64::NEG_INFINITY);
    }
    let mut log_p = ordered_poisson_log_p(doomed.len(), creation_mean(acg, ctx, area));
    for id in &doomed {
        if let Some(conv) = acg.conversion(*id) {
            log_p += -area.ln()
                + edge_coalescence_prob(acg, ctx.population, conv.height1, conv.height2)
                + affected_region_prob(acg, ctx.delta(), conv);
        }
    }
    for id in doomed {
        acg.delete_conversion(id)?;
    }
    Ok(log_p)
}

/// Adds a Poisson number of conversions departing uniformly from `segments`
/// and returns the log density of the draw.
pub(crate) fn create_departures(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    segments: &[Segment],
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let area: f64 = segments.iter().map(Segment::length).sum();
    let mean = creation_mean(acg, ctx, area);
    let count = rng.poisson(mean) as usize;
    let mut log_p = ordered_poisson_log_p(count, mean);
    for _ in 0..count {
        let mut u = rng.uniform() * area;
        let mut departure = None;
        for segment in segments {
            if u < segment.length() {
                departure = Some((segment.node, segment.lower + u));
                break;
            }
            u -= segment.length();
        }
        let Some((node1, height1)) =
            departure.or_else(|| segments.last().map(|s| (s.node, s.upper)))
        else {
            break;
        };
        let (node2, height2, arrival_log_p) = coalesce_edge(acg, ctx.population, height1, rng)?;
        let (region, region_log_p) = draw_affected_region(acg, ctx.delta(), rng);
        let conv = Conversion::new(
            region.locus,
            region.start,
            region.end,
            node1,
            height1,
            node2,
            height2,
        );
        acg.add_conversion(conv)?;
        log_p += -area.ln() + arrival_log_p + region_log_p;
    }
    log::trace!("created {count} conversions on a volatile stretch of length {area}");
    Ok(log_p)
}

/// Endpoints lying strictly between `lower` and `upper` on the lineage
/// ancestral to `node`.
pub(crate) fn ancestral_endpoints(
    acg: &ConversionGraph,
    node: NodeId,
    lower: f64,
    upper: f64,
) -> Vec<Endpoint> {
    let frame = acg.frame();
    endpoints_where(acg, |on, h| h > lower && h < upper && frame.is_ancestor(on, node))
}

/// Moves each endpoint in `endpoints` onto the lineage ancestral to `junction`
/// at the endpoint's own height.
pub(crate) fn collapse_onto(acg: &mut ConversionGraph, endpoints: &[Endpoint], junction: NodeId) {
    for endpoint in endpoints {
        if let Some((_, height)) = endpoint.location(acg) {
            let target = reattach(acg.frame(), junction, height);
            endpoint.set_node(acg, target);
        }
    }
}

/// Flips a fair coin per endpoint and returns those that came up heads.
pub(crate) fn expand_selection(endpoints: Vec<Endpoint>, rng: &mut RngHandle) -> Vec<Endpoint> {
    endpoints.into_iter().filter(|_| rng.coin()).collect()
}
