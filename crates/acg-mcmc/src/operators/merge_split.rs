use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_core::LOG_HALF;
use acg_graph::{Conversion, ConversionGraph, ConversionId, ConversionModel, NodeId};

use super::{ensure_valid, Operator, ProposalContext};
use crate::params::tract_extension_log_p;

/// Splits one conversion in two or merges two conversions that share both
/// attachment edges.
///
/// Under the restricted model the split leaves a geometric gap between the
/// two pieces and merges act on neighbouring conversions. Under the
/// unrestricted model the pieces are cut at two independent uniform sites
/// and merges act on any ordered pair.
#[derive(Debug, Clone, Copy)]
pub struct MergeSplitConversion {
    expected_gap: f64,
}

impl Default for MergeSplitConversion {
    fn default() -> Self {
        Self { expected_gap: 10.0 }
    }
}

impl MergeSplitConversion {
    /// Creates the operator with the mean gap left by restricted splits.
    pub fn new(expected_gap: f64) -> Self {
        Self { expected_gap }
    }
}

/// Range from which the arrival of a split-off piece is drawn: the edge
/// above `node2`, or twice the root height at the root.
fn arrival_range(acg: &ConversionGraph, node2: NodeId, height1: f64) -> (f64, f64) {
    let frame = acg.frame();
    let lower = height1.max(frame.height(node2));
    let upper = frame
        .parent_height(node2)
        .unwrap_or(2.0 * frame.height(node2));
    (lower, upper)
}

/// Density of the fresh edge heights given to a split-off piece, `-inf` when
/// the heights fall outside the ranges the split draws from.
fn piece_heights_log_p(acg: &ConversionGraph, piece: &Conversion) -> f64 {
    let branch = acg.frame().branch_length(piece.node1);
    let (lower, upper) = arrival_range(acg, piece.node2, piece.height1);
    if !(branch > 0.0 && upper > lower && piece.height2 <= upper) {
        return f64::NEG_INFINITY;
    }
    -branch.ln() - (upper - lower).ln()
}

fn draw_piece_heights(
    acg: &ConversionGraph,
    node1: NodeId,
    node2: NodeId,
    rng: &mut RngHandle,
) -> Option<(f64, f64)> {
    let frame = acg.frame();
    let branch = frame.branch_length(node1);
    let height1 = frame.height(node1) + rng.uniform() * branch;
    let (lower, upper) = arrival_range(acg, node2, height1);
    if !(branch > 0.0 && upper > lower) {
        return None;
    }
    Some((height1, lower + rng.uniform() * (upper - lower)))
}

fn gap_log_p(gap: usize, expected_gap: f64) -> f64 {
    tract_extension_log_p(gap, expected_gap) - expected_gap.ln()
}

/// Neighbouring pairs of the same locus with identical attachment edges.
fn mergeable_neighbours(acg: &ConversionGraph) -> Vec<(ConversionId, ConversionId)> {
    (0..acg.loci().len())
        .flat_map(|locus| {
            acg.conversions(locus)
                .windows(2)
                .filter(|pair| pair[0].same_edges(&pair[1]))
                .map(|pair| (pair[0].id(), pair[1].id()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Orders two conversions as `(first, second)` when the first starts and ends
/// no later than the second and the regions differ.
fn ordered_regions<'a>(a: &'a Conversion, b: &'a Conversion) -> Option<(&'a Conversion, &'a Conversion)> {
    if (a.start(), a.end()) == (b.start(), b.end()) {
        return None;
    }
    if a.start() <= b.start() && a.end() <= b.end() {
        Some((a, b))
    } else if b.start() <= a.start() && b.end() <= a.end() {
        Some((b, a))
    } else {
        None
    }
}

/// Splits a uniformly chosen conversion. Returns the log Hastings ratio.
pub fn split_proposal(
    acg: &mut ConversionGraph,
    expected_gap: f64,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let count = acg.conversion_count();
    let Some(id) = acg.choose_conversion(rng) else {
        return Ok(f64::NEG_INFINITY);
    };
    let Some(conv) = acg.conversion(id).cloned() else {
        return Ok(f64::NEG_INFINITY);
    };
    match acg.model() {
        ConversionModel::Restricted => split_restricted(acg, conv, count, expected_gap, rng),
        ConversionModel::Unrestricted => split_unrestricted(acg, conv, count, rng),
    }
}

fn split_restricted(
    acg: &mut ConversionGraph,
    conv: Conversion,
    count: usize,
    expected_gap: f64,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let sites = conv.site_count();
    if sites < 3 {
        return Ok(f64::NEG_INFINITY);
    }
    let cut = conv.start() + rng.uniform_index(sites - 2);
    let gap = rng.geometric(1.0 / expected_gap) as usize;
    let second_start = cut + 2 + gap;
    if second_start > conv.end() {
        return Ok(f64::NEG_INFINITY);
    }
    let Some((height1, height2)) = draw_piece_heights(acg, conv.node1, conv.node2, rng) else {
        return Ok(f64::NEG_INFINITY);
    };
    let piece = Conversion::new(
        conv.locus(),
        second_start,
        conv.end(),
        conv.node1,
        height1,
        conv.node2,
        height2,
    );
    let forward = -(count as f64).ln() - ((sites - 2) as f64).ln()
        + gap_log_p(gap, expected_gap)
        + piece_heights_log_p(acg, &piece);

    acg.set_conversion_region(conv.id(), conv.start(), cut)?;
    acg.add_conversion(piece)?;

    let reverse = -(mergeable_neighbours(acg).len() as f64).ln();
    Ok(reverse - forward)
}

fn split_unrestricted(
    acg: &mut ConversionGraph,
    conv: Conversion,
    count: usize,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    if acg.whole_locus_mode() {
        return Ok(f64::NEG_INFINITY);
    }
    let sites = conv.site_count();
    let first_end = conv.start() + rng.uniform_index(sites);
    let second_start = conv.start() + rng.uniform_index(sites);
    if first_end == conv.end() && second_start == conv.start() {
        return Ok(f64::NEG_INFINITY);
    }
    let keeper_is_first = rng.coin();
    let Some((height1, height2)) = draw_piece_heights(acg, conv.node1, conv.node2, rng) else {
        return Ok(f64::NEG_INFINITY);
    };
    let fresh = |start, end| {
        Conversion::new(conv.locus(), start, end, conv.node1, height1, conv.node2, height2)
    };
    let (keeper_region, piece) = if keeper_is_first {
        ((conv.start(), first_end), fresh(second_start, conv.end()))
    } else {
        ((second_start, conv.end()), fresh(conv.start(), first_end))
    };
    let forward = -(count as f64).ln() - 2.0 * (sites as f64).ln() + LOG_HALF
        + piece_heights_log_p(acg, &piece);

    acg.set_conversion_region(conv.id(), keeper_region.0, keeper_region.1)?;
    acg.add_conversion(piece)?;

    let after = acg.conversion_count() as f64;
    let reverse = -(after * (after - 1.0)).ln();
    Ok(reverse - forward)
}

/// Merges two conversions sharing both attachment edges. Returns the log
/// Hastings ratio.
pub fn merge_proposal(
    acg: &mut ConversionGraph,
    expected_gap: f64,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    match acg.model() {
        ConversionModel::Restricted => merge_restricted(acg, expected_gap, rng),
        ConversionModel::Unrestricted => merge_unrestricted(acg, rng),
    }
}

fn merge_restricted(
    acg: &mut ConversionGraph,
    expected_gap: f64,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let pairs = mergeable_neighbours(acg);
    if pairs.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let forward = -(pairs.len() as f64).ln();
    let (first_id, second_id) = pairs[rng.uniform_index(pairs.len())];
    let (Some(first), Some(second)) = (acg.conversion(first_id), acg.conversion(second_id)) else {
        return Ok(f64::NEG_INFINITY);
    };
    let Some(gap) = second.start().checked_sub(first.end() + 2) else {
        return Ok(f64::NEG_INFINITY);
    };
    let (start, end) = (first.start(), second.end());
    let merged_sites = end - start + 1;
    let remaining = (acg.conversion_count() - 1) as f64;
    let reverse = -remaining.ln() - ((merged_sites - 2) as f64).ln()
        + gap_log_p(gap, expected_gap)
        + piece_heights_log_p(acg, second);
    if reverse == f64::NEG_INFINITY {
        return Ok(reverse);
    }

    acg.delete_conversion(second_id)?;
    acg.set_conversion_region(first_id, start, end)?;
    Ok(reverse - forward)
}

fn merge_unrestricted(acg: &mut ConversionGraph, rng: &mut RngHandle) -> Result<f64, AcgError> {
    let count = acg.conversion_count();
    if count < 2 || acg.whole_locus_mode() {
        return Ok(f64::NEG_INFINITY);
    }
    let forward = -((count * (count - 1)) as f64).ln();
    let keeper_idx = rng.uniform_index(count);
    let mut other_idx = rng.uniform_index(count - 1);
    if other_idx >= keeper_idx {
        other_idx += 1;
    }
    let (Some(keeper), Some(other)) = (acg.conversion_at(keeper_idx), acg.conversion_at(other_idx))
    else {
        return Ok(f64::NEG_INFINITY);
    };
    if keeper.locus() != other.locus() || !keeper.same_edges(other) {
        return Ok(f64::NEG_INFINITY);
    }
    let Some((first, second)) = ordered_regions(keeper, other) else {
        return Ok(f64::NEG_INFINITY);
    };
    let (start, end) = (first.start(), second.end());
    let merged_sites = (end - start + 1) as f64;
    let remaining = (count - 1) as f64;
    let reverse = -remaining.ln() - 2.0 * merged_sites.ln() + LOG_HALF
        + piece_heights_log_p(acg, other);
    if reverse == f64::NEG_INFINITY {
        return Ok(reverse);
    }

    let (keeper_id, other_id) = (keeper.id(), other.id());
    acg.delete_conversion(other_id)?;
    acg.set_conversion_region(keeper_id, start, end)?;
    Ok(reverse - forward)
}

impl Operator for MergeSplitConversion {
    fn name(&self) -> &'static str {
        "merge-split-conversion"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let log_hr = if rng.coin() {
            split_proposal(acg, self.expected_gap, rng)?
        } else {
            merge_proposal(acg, self.expected_gap, rng)?
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
