//! Edge and region sampling primitives together with the densities that
//! invert them. Operators that create a conversion draw with these functions
//! and operators that remove one evaluate the matching density.

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::population::PopulationFunction;
use acg_core::rng::RngHandle;
use acg_graph::{Conversion, ConversionGraph, NodeId};

use crate::params::{site_mass, tract_extension_log_p};

/// Endpoints of a freshly drawn conversion edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDraw {
    /// Departure lineage.
    pub node1: NodeId,
    /// Departure height.
    pub height1: f64,
    /// Arrival lineage.
    pub node2: NodeId,
    /// Arrival height.
    pub height2: f64,
}

/// Converted region of a freshly drawn conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDraw {
    /// Locus index.
    pub locus: usize,
    /// First converted site.
    pub start: usize,
    /// Last converted site.
    pub end: usize,
}

impl EdgeDraw {
    /// Combines the edge with a region into an unregistered conversion.
    pub fn into_conversion(self, region: RegionDraw) -> Conversion {
        Conversion::new(
            region.locus,
            region.start,
            region.end,
            self.node1,
            self.height1,
            self.node2,
            self.height2,
        )
    }
}

/// Draws a departure point uniformly on the clonal frame and an arrival
/// point with [`coalesce_edge`]. Returns the edge and its log density.
pub fn attach_edge(
    acg: &ConversionGraph,
    population: &dyn PopulationFunction,
    rng: &mut RngHandle,
) -> Result<(EdgeDraw, f64), AcgError> {
    let frame = acg.frame();
    let length = acg.clonal_frame_length();
    if !(length > 0.0) {
        return Err(AcgError::Model(
            ErrorInfo::new("empty-frame", "clonal frame has no branch length to attach to")
                .with_context("length", length),
        ));
    }

    let mut u = rng.uniform() * length;
    let mut departure = None;
    let mut last = None;
    for node in frame.non_root_nodes() {
        let branch = frame.branch_length(node);
        last = Some(node);
        if u < branch {
            departure = Some((node, frame.height(node) + u));
            break;
        }
        u -= branch;
    }
    let (node1, height1) = match (departure, last) {
        (Some(found), _) => found,
        (None, Some(node)) => (node, frame.parent_height(node).unwrap_or(frame.height(node))),
        (None, None) => {
            return Err(AcgError::Model(ErrorInfo::new(
                "empty-frame",
                "clonal frame has no edges",
            )))
        }
    };

    let (node2, height2, log_p) = coalesce_edge(acg, population, height1, rng)?;
    Ok((
        EdgeDraw {
            node1,
            height1,
            node2,
            height2,
        },
        log_p - length.ln(),
    ))
}

/// Draws an arrival point for a lineage leaving the clonal frame at
/// `height1`, coalescing with the `k` extant lineages at rate `k / N(t)`.
///
/// Returns the arrival lineage, its height and the log density of the draw.
pub fn coalesce_edge(
    acg: &ConversionGraph,
    population: &dyn PopulationFunction,
    height1: f64,
    rng: &mut RngHandle,
) -> Result<(NodeId, f64, f64), AcgError> {
    let events = acg.cf_events();
    let mut u = rng.exponential(1.0);
    let mut log_p = 0.0;

    for idx in events.interval_containing(height1)..events.len() {
        let k = events.events()[idx].lineages as f64;
        let t = height1.max(events.events()[idx].height);
        let area = match events.interval_end(idx) {
            Some(end) => population.integral(t, end),
            None => f64::INFINITY,
        };
        if u < area * k {
            let height2 = population.inverse_intensity(population.intensity(t) + u / k);
            let node2 = choose_extant_lineage(acg, height2, rng)?;
            log_p += -u - population.pop_size(height2).ln();
            log::trace!("edge from {height1} coalesces with {node2} at {height2}");
            return Ok((node2, height2, log_p));
        }
        u -= area * k;
        log_p -= area * k;
    }

    Err(AcgError::Model(
        ErrorInfo::new("coalescence-overflow", "arrival draw ran past the last interval")
            .with_context("height1", height1),
    ))
}

fn choose_extant_lineage(
    acg: &ConversionGraph,
    height: f64,
    rng: &mut RngHandle,
) -> Result<NodeId, AcgError> {
    let frame = acg.frame();
    let lineages: Vec<NodeId> = frame
        .node_ids()
        .filter(|id| {
            height > frame.height(*id) && frame.parent_height(*id).map_or(true, |h| height < h)
        })
        .collect();
    if lineages.is_empty() {
        return Err(AcgError::Model(
            ErrorInfo::new("no-lineage", "no clonal frame lineage spans the arrival height")
                .with_context("height", height),
        ));
    }
    Ok(lineages[rng.uniform_index(lineages.len())])
}

/// Log density of [`coalesce_edge`] producing an arrival at `height2` on a
/// specific lineage, given departure at `height1`.
pub fn edge_coalescence_prob(
    acg: &ConversionGraph,
    population: &dyn PopulationFunction,
    height1: f64,
    height2: f64,
) -> f64 {
    let events = acg.cf_events();
    let mut log_p = 0.0;
    for idx in events.interval_containing(height1)..events.len() {
        let event = &events.events()[idx];
        if event.height >= height2 && event.height > height1 {
            break;
        }
        let t0 = height1.max(event.height);
        let t1 = events.interval_end(idx).map_or(height2, |end| end.min(height2));
        if t1 > t0 {
            log_p -= event.lineages as f64 * population.integral(t0, t1);
        }
    }
    log_p - population.pop_size(height2).ln()
}

/// Log density of [`attach_edge`] producing the endpoints of `conv`.
pub fn edge_attachment_prob(
    acg: &ConversionGraph,
    population: &dyn PopulationFunction,
    conv: &Conversion,
) -> f64 {
    -acg.clonal_frame_length().ln()
        + edge_coalescence_prob(acg, population, conv.height1, conv.height2)
}

/// Draws a converted region over all loci.
///
/// The start site is drawn from a mass of `L + δ - 1` per locus, with `δ`
/// units on the first site, and the tract extends geometrically with mean
/// `δ`, truncated at the locus end. In whole-locus mode the locus is chosen
/// by relative size and the region covers it entirely.
pub fn draw_affected_region(
    acg: &ConversionGraph,
    delta: f64,
    rng: &mut RngHandle,
) -> (RegionDraw, f64) {
    let loci = acg.loci();
    if acg.whole_locus_mode() {
        let weights: Vec<f64> = loci.iter().map(|l| l.site_count() as f64).collect();
        let locus = rng.weighted_index(&weights).unwrap_or(0);
        let region = RegionDraw {
            locus,
            start: 0,
            end: loci[locus].last_site(),
        };
        let log_p = (loci[locus].site_count() as f64 / acg.total_sites() as f64).ln();
        return (region, log_p);
    }

    let alpha = site_mass(acg.total_sites(), loci.len(), delta);
    let mut u = rng.uniform() * alpha;
    let mut chosen = (loci.len() - 1, loci[loci.len() - 1].last_site());
    let mut log_p = -alpha.ln();
    for (idx, locus) in loci.iter().enumerate() {
        let block = delta - 1.0 + locus.site_count() as f64;
        if u < block {
            let start = if u < delta {
                log_p = (delta / alpha).ln();
                0
            } else {
                ((u - delta).ceil() as usize).min(locus.last_site())
            };
            chosen = (idx, start);
            break;
        }
        u -= block;
    }

    let (locus, start) = chosen;
    let last = loci[locus].last_site();
    let extension = rng.geometric(1.0 / delta);
    let end = start.saturating_add(extension as usize).min(last);
    let region = RegionDraw { locus, start, end };
    (region, log_p + tract_end_log_p(start, end, last, delta))
}

fn tract_end_log_p(start: usize, end: usize, last: usize, delta: f64) -> f64 {
    if end == last {
        tract_extension_log_p(last - start, delta)
    } else {
        tract_extension_log_p(end - start, delta) - delta.ln()
    }
}

/// Log density of [`draw_affected_region`] producing the region of `conv`.
pub fn affected_region_prob(acg: &ConversionGraph, delta: f64, conv: &Conversion) -> f64 {
    let Some(locus) = acg.locus(conv.locus()) else {
        return f64::NEG_INFINITY;
    };
    if acg.whole_locus_mode() {
        if conv.start() != 0 || conv.end() != locus.last_site() {
            return f64::NEG_INFINITY;
        }
        return (locus.site_count() as f64 / acg.total_sites() as f64).ln();
    }
    let alpha = site_mass(acg.total_sites(), acg.loci().len(), delta);
    let start_term = if conv.start() == 0 {
        (delta / alpha).ln()
    } else {
        -alpha.ln()
    };
    start_term + tract_end_log_p(conv.start(), conv.end(), locus.last_site(), delta)
}

/// Number of sites of `locus` at which a new restricted conversion may start,
/// ignoring the conversion at index `skip`.
pub fn convertible_site_count(acg: &ConversionGraph, locus: usize, skip: Option<usize>) -> usize {
    let Some(locus_def) = acg.locus(locus) else {
        return 0;
    };
    let mut count = 0usize;
    let mut free_from = 0usize;
    for (idx, conv) in acg.conversions(locus).iter().enumerate() {
        if Some(idx) == skip {
            continue;
        }
        count += (conv.start().saturating_sub(1)).saturating_sub(free_from);
        free_from = conv.end() + 2;
    }
    count + locus_def.site_count().saturating_sub(free_from)
}

/// Draws a restricted region in `locus`: a uniformly chosen convertible
/// start site and a geometric tract. Returns `None` when no site is
/// convertible or the tract would run into a neighbour or off the locus.
pub fn draw_restricted_region(
    acg: &ConversionGraph,
    locus: usize,
    delta: f64,
    rng: &mut RngHandle,
) -> Option<(RegionDraw, f64)> {
    let count = convertible_site_count(acg, locus, None);
    if count == 0 {
        return None;
    }
    let mut site = rng.uniform_index(count);
    let mut free_from = 0usize;
    for conv in acg.conversions(locus) {
        let gap = conv.start().saturating_sub(1).saturating_sub(free_from);
        if site < gap {
            break;
        }
        site -= gap;
        free_from = conv.end() + 2;
    }
    let start = free_from + site;
    let extension = rng.geometric(1.0 / delta) as usize;
    let end = start.checked_add(extension)?;
    if !acg.region_is_free(locus, start, end, None) {
        log::debug!("restricted tract [{start}, {end}] collides in locus {locus}");
        return None;
    }
    let log_p = -(count as f64).ln() + tract_extension_log_p(extension, delta) - delta.ln();
    Some((RegionDraw { locus, start, end }, log_p))
}

/// Log density of [`draw_restricted_region`] producing the region of `conv`,
/// with `conv` itself excluded from the convertible-site count.
pub fn restricted_region_prob(acg: &ConversionGraph, delta: f64, conv: &Conversion) -> f64 {
    let skip = acg
        .conversions(conv.locus())
        .iter()
        .position(|c| c.id() == conv.id());
    let count = convertible_site_count(acg, conv.locus(), skip);
    if count == 0 {
        return f64::NEG_INFINITY;
    }
    -(count as f64).ln() + tract_extension_log_p(conv.end() - conv.start(), delta) - delta.ln()
}
