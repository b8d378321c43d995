use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::rng::RngHandle;
use acg_graph::{reattach, Conversion, ConversionGraph, ConversionModel, NodeId};

use super::{departs_from_root, ensure_valid, Operator, ProposalContext};
use crate::sampling::{
    affected_region_prob, attach_edge, draw_affected_region, edge_attachment_prob, RegionDraw,
};

/// Exchanges the clonal frame with the marginal tree of one conversion.
///
/// Under the restricted model the converted and unconverted stretches of the
/// chosen locus trade places: the old frame path becomes a conversion on a
/// random unconverted stretch and every other conversion receives a fresh
/// edge. Under the unrestricted model the move is a reversible-jump pair that
/// either draws a new conversion and swaps it into the frame, or removes a
/// conversion by swapping it back out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClonalFrameConversionSwap;

impl ClonalFrameConversionSwap {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

/// Unconverted stretches of `locus`, in site order.
fn gaps(acg: &ConversionGraph, locus: usize) -> Vec<(usize, usize)> {
    let Some(locus_def) = acg.locus(locus) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut next_free = 0usize;
    for conv in acg.conversions(locus) {
        if conv.start() > next_free {
            out.push((next_free, conv.start() - 1));
        }
        next_free = next_free.max(conv.end() + 1);
    }
    if next_free <= locus_def.last_site() {
        out.push((next_free, locus_def.last_site()));
    }
    out
}

/// Whether any endpoint sits on the edge above `node` higher than `height`.
fn occupied_above(acg: &ConversionGraph, node: NodeId, height: f64) -> bool {
    acg.all_conversions().any(|c| {
        (c.node1 == node && c.height1 > height) || (c.node2 == node && c.height2 > height)
    })
}

/// Regrafts the parent of `src` at `height` on the lineage of `target`, and
/// returns the lineage and height where `src` used to join the frame.
fn regraft(
    acg: &mut ConversionGraph,
    src: NodeId,
    target: NodeId,
    height: f64,
) -> Result<(NodeId, f64), AcgError> {
    let frame = acg.frame();
    let (Some(parent), Some(sibling)) = (frame.parent(src), frame.sibling(src)) else {
        return Err(AcgError::Graph(
            ErrorInfo::new("detach-root", "cannot regraft the root")
                .with_context("node", src),
        ));
    };
    let old_time = frame.height(parent);
    let dest = if target == parent { sibling } else { target };
    acg.disconnect_edge(src)?;
    acg.connect_edge(src, dest, height)?;
    Ok((reattach(acg.frame(), sibling, old_time), old_time))
}

fn swap_restricted(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let locus = acg.choose_locus(rng);
    let count = acg.locus_conversion_count(locus);
    let gap_regions = gaps(acg, locus);
    if count == 0 || gap_regions.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let chosen = acg.conversions(locus)[rng.uniform_index(count)].clone();
    if chosen.node1 == chosen.node2 || acg.frame().is_ancestor(chosen.node1, chosen.node2) {
        return Ok(f64::NEG_INFINITY);
    }

    let mut log_hr: f64 = acg
        .all_conversions()
        .filter(|c| c.id() != chosen.id())
        .map(|c| edge_attachment_prob(acg, ctx.population, c))
        .sum();

    let chosen_gap = rng.uniform_index(gap_regions.len());
    let redrawn: Vec<(usize, usize, usize)> = acg
        .all_conversions()
        .filter(|c| c.locus() != locus)
        .map(|c| (c.locus(), c.start(), c.end()))
        .collect();
    for idx in 0..acg.loci().len() {
        acg.clear_locus(idx);
    }

    let (old_node, old_time) = regraft(acg, chosen.node1, chosen.node2, chosen.height2)?;

    for (idx, (start, end)) in gap_regions.into_iter().enumerate() {
        let conv = if idx == chosen_gap {
            Conversion::new(locus, start, end, chosen.node1, chosen.height1, old_node, old_time)
        } else {
            let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
            log_hr -= edge_log_p;
            edge.into_conversion(RegionDraw { locus, start, end })
        };
        acg.add_conversion(conv)?;
    }
    for (other_locus, start, end) in redrawn {
        let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
        log_hr -= edge_log_p;
        acg.add_conversion(edge.into_conversion(RegionDraw {
            locus: other_locus,
            start,
            end,
        }))?;
    }
    Ok(log_hr)
}

fn create_swap(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let (region, region_log_p) = draw_affected_region(acg, ctx.delta(), rng);
    let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
    if edge.node1 == edge.node2
        || acg.frame().is_ancestor(edge.node1, edge.node2)
        || occupied_above(acg, edge.node1, edge.height1)
    {
        return Ok(f64::NEG_INFINITY);
    }

    let (old_node, old_time) = regraft(acg, edge.node1, edge.node2, edge.height2)?;
    acg.add_conversion(Conversion::new(
        region.locus,
        region.start,
        region.end,
        edge.node1,
        edge.height1,
        old_node,
        old_time,
    ))?;
    if departs_from_root(acg) {
        return Ok(f64::NEG_INFINITY);
    }
    let count = acg.conversion_count() as f64;
    Ok(-(region_log_p + edge_log_p) - count.ln())
}

fn delete_swap(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let count = acg.conversion_count() as f64;
    let Some(id) = acg.choose_conversion(rng) else {
        return Ok(f64::NEG_INFINITY);
    };
    let Some(chosen) = acg.conversion(id).cloned() else {
        return Ok(f64::NEG_INFINITY);
    };
    if chosen.node1 == chosen.node2
        || acg.frame().is_ancestor(chosen.node1, chosen.node2)
        || occupied_above(acg, chosen.node1, chosen.height1)
    {
        return Ok(f64::NEG_INFINITY);
    }

    acg.delete_conversion(id)?;
    let (old_node, old_time) = regraft(acg, chosen.node1, chosen.node2, chosen.height2)?;
    let restored = Conversion::new(
        chosen.locus(),
        chosen.start(),
        chosen.end(),
        chosen.node1,
        chosen.height1,
        old_node,
        old_time,
    );
    if departs_from_root(acg) {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(count.ln()
        + affected_region_prob(acg, ctx.delta(), &restored)
        + edge_attachment_prob(acg, ctx.population, &restored))
}

impl Operator for ClonalFrameConversionSwap {
    fn name(&self) -> &'static str {
        "cf-conversion-swap"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let log_hr = match acg.model() {
            ConversionModel::Restricted => swap_restricted(acg, ctx, rng)?,
            ConversionModel::Unrestricted if rng.coin() => create_swap(acg, ctx, rng)?,
            ConversionModel::Unrestricted => delete_swap(acg, ctx, rng)?,
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
