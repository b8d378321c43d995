use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{Conversion, ConversionGraph, ConversionId};

use super::{ensure_valid, Operator, ProposalContext};
use crate::params::tract_extension_log_p;
use crate::sampling::{attach_edge, edge_attachment_prob};

/// Cuts a gap into one conversion and hands the far side of the gap to a
/// fresh edge, or fuses two conversions separated by a gap and drops the
/// edge of one of them.
///
/// Unlike [`super::MergeSplitConversion`] the two pieces need not share
/// their edges: the piece split off is attached anew with
/// [`attach_edge`], so the move changes the graph's topology as well as
/// its regions.
#[derive(Debug, Clone, Copy)]
pub struct ReplaceConversion {
    expected_gap: f64,
}

impl Default for ReplaceConversion {
    fn default() -> Self {
        Self { expected_gap: 10.0 }
    }
}

impl ReplaceConversion {
    /// Creates the operator with the mean length of the gap it cuts.
    pub fn new(expected_gap: f64) -> Self {
        Self { expected_gap }
    }
}

/// Log probability of a gap of `gap >= 1` unconverted sites.
fn gap_log_p(gap: usize, expected_gap: f64) -> f64 {
    tract_extension_log_p(gap - 1, expected_gap) - expected_gap.ln()
}

/// Same-locus pairs `(first, second)` with at least one unconverted site
/// between the end of `first` and the start of `second`.
fn fusable_pairs(acg: &ConversionGraph) -> Vec<(ConversionId, ConversionId)> {
    let mut out = Vec::new();
    for locus in 0..acg.loci().len() {
        let list = acg.conversions(locus);
        for first in list {
            for second in list {
                if first.end() + 1 < second.start() {
                    out.push((first.id(), second.id()));
                }
            }
        }
    }
    out
}

fn split(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
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
    let sites = conv.site_count();
    if sites < 3 {
        return Ok(f64::NEG_INFINITY);
    }
    let gap_start = conv.start() + 1 + rng.uniform_index(sites - 2);
    let gap = 1 + rng.geometric(1.0 / expected_gap) as usize;
    let gap_end = gap_start + gap - 1;
    if gap_end >= conv.end() {
        return Ok(f64::NEG_INFINITY);
    }

    let piece_on_right = rng.coin();
    let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
    let forward = -(count as f64).ln() - ((sites - 2) as f64).ln()
        + gap_log_p(gap, expected_gap)
        + edge_log_p;

    let left = (conv.start(), gap_start - 1);
    let right = (gap_end + 1, conv.end());
    let (kept, piece) = if piece_on_right {
        (left, right)
    } else {
        (right, left)
    };
    acg.set_conversion_region(id, kept.0, kept.1)?;
    acg.add_conversion(Conversion::new(
        conv.locus(),
        piece.0,
        piece.1,
        edge.node1,
        edge.height1,
        edge.node2,
        edge.height2,
    ))?;

    let reverse = -(fusable_pairs(acg).len() as f64).ln();
    Ok(reverse - forward)
}

fn fuse(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    expected_gap: f64,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let pairs = fusable_pairs(acg);
    if pairs.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let forward = -(pairs.len() as f64).ln();
    let (first_id, second_id) = pairs[rng.uniform_index(pairs.len())];
    let (kept_id, dropped_id) = if rng.coin() {
        (first_id, second_id)
    } else {
        (second_id, first_id)
    };
    let (Some(first), Some(second), Some(dropped)) = (
        acg.conversion(first_id),
        acg.conversion(second_id),
        acg.conversion(dropped_id),
    ) else {
        return Ok(f64::NEG_INFINITY);
    };
    let (locus, start, end) = (first.locus(), first.start(), second.end());
    let gap = second.start() - first.end() - 1;
    let fused_sites = end - start + 1;
    let reverse = -((acg.conversion_count() - 1) as f64).ln()
        - ((fused_sites - 2) as f64).ln()
        + gap_log_p(gap, expected_gap)
        + edge_attachment_prob(acg, ctx.population, dropped);

    acg.delete_conversion(dropped_id)?;
    if !acg.region_is_free(locus, start, end, Some(kept_id)) {
        return Ok(f64::NEG_INFINITY);
    }
    acg.set_conversion_region(kept_id, start, end)?;
    Ok(reverse - forward)
}

impl Operator for ReplaceConversion {
    fn name(&self) -> &'static str {
        "replace-conversion"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        if acg.whole_locus_mode() {
            return Ok(f64::NEG_INFINITY);
        }
        let log_hr = if rng.coin() {
            split(acg, ctx, self.expected_gap, rng)?
        } else {
            fuse(acg, ctx, self.expected_gap, rng)?
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
