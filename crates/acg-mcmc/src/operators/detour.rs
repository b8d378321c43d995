use std::f64::consts::LN_2;

use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{Conversion, ConversionGraph, ConversionId, ConversionModel, NodeId};

use super::{ensure_valid, Operator, ProposalContext};
use crate::sampling::{affected_region_prob, draw_affected_region};

/// Replaces a conversion by a two-step path through a third clonal frame
/// edge, or contracts such a path back into a single conversion.
///
/// The first leg keeps the original region; the second leg receives a fresh
/// region. Only meaningful under the unrestricted model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRemoveDetour;

impl AddRemoveDetour {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

/// Conversions that end on `detour` and conversions that leave from it,
/// excluding loops on the detour edge itself.
fn detour_legs(acg: &ConversionGraph, detour: NodeId) -> (Vec<ConversionId>, Vec<ConversionId>) {
    let arriving = acg
        .all_conversions()
        .filter(|c| c.node2 == detour && c.node1 != detour)
        .map(Conversion::id)
        .collect();
    let departing = acg
        .all_conversions()
        .filter(|c| c.node1 == detour && c.node2 != detour)
        .map(Conversion::id)
        .collect();
    (arriving, departing)
}

fn add_detour(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let count = acg.conversion_count() as f64;
    let Some(id) = acg.choose_conversion(rng) else {
        return Ok(f64::NEG_INFINITY);
    };
    let Some(conv) = acg.conversion(id).cloned() else {
        return Ok(f64::NEG_INFINITY);
    };
    let mut log_hr = count.ln();

    let span = conv.height2 - conv.height1;
    if !(span > 0.0) {
        return Ok(f64::NEG_INFINITY);
    }
    let a = conv.height1 + rng.uniform() * span;
    let b = conv.height1 + rng.uniform() * span;
    let (lower, upper) = (a.min(b), a.max(b));
    log_hr -= LN_2 - 2.0 * span.ln();

    let frame = acg.frame();
    let candidates: Vec<NodeId> = frame.non_root_nodes().collect();
    if candidates.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let detour = candidates[rng.uniform_index(candidates.len())];
    let choices = candidates.len() as f64;
    log_hr += choices.ln();
    if detour == conv.node1 || detour == conv.node2 {
        return Ok(f64::NEG_INFINITY);
    }
    let spans_both = frame.height(detour) <= lower
        && frame.parent_height(detour).is_some_and(|top| upper <= top);
    if !spans_both {
        return Ok(f64::NEG_INFINITY);
    }

    let (region, region_log_p) = draw_affected_region(acg, ctx.delta(), rng);
    log_hr -= region_log_p;
    let first = Conversion::new(
        conv.locus(),
        conv.start(),
        conv.end(),
        conv.node1,
        conv.height1,
        detour,
        lower,
    );
    let second = Conversion::new(
        region.locus,
        region.start,
        region.end,
        detour,
        upper,
        conv.node2,
        conv.height2,
    );
    acg.delete_conversion(id)?;
    acg.add_conversion(first)?;
    acg.add_conversion(second)?;

    let (arriving, departing) = detour_legs(acg, detour);
    log_hr -= (choices * arriving.len() as f64 * departing.len() as f64).ln();
    Ok(log_hr)
}

fn remove_detour(
    acg: &mut ConversionGraph,
    ctx: &ProposalContext<'_>,
    rng: &mut RngHandle,
) -> Result<f64, AcgError> {
    let frame = acg.frame();
    let candidates: Vec<NodeId> = frame.non_root_nodes().collect();
    if candidates.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let detour = candidates[rng.uniform_index(candidates.len())];
    let (arriving, departing) = detour_legs(acg, detour);
    if arriving.is_empty() || departing.is_empty() {
        return Ok(f64::NEG_INFINITY);
    }
    let first_id = arriving[rng.uniform_index(arriving.len())];
    let second_id = departing[rng.uniform_index(departing.len())];
    let (Some(first), Some(second)) = (acg.conversion(first_id), acg.conversion(second_id)) else {
        return Ok(f64::NEG_INFINITY);
    };
    if first.height2 > second.height1 {
        return Ok(f64::NEG_INFINITY);
    }
    let span = second.height2 - first.height1;
    if !(span > 0.0) {
        return Ok(f64::NEG_INFINITY);
    }
    let merged = Conversion::new(
        first.locus(),
        first.start(),
        first.end(),
        first.node1,
        first.height1,
        second.node2,
        second.height2,
    );
    // Detour choice cancels against the reverse detour choice.
    let mut log_hr = (arriving.len() as f64 * departing.len() as f64).ln() + LN_2
        - 2.0 * span.ln()
        + affected_region_prob(acg, ctx.delta(), second);

    acg.delete_conversion(first_id)?;
    acg.delete_conversion(second_id)?;
    acg.add_conversion(merged)?;
    log_hr -= (acg.conversion_count() as f64).ln();
    Ok(log_hr)
}

impl Operator for AddRemoveDetour {
    fn name(&self) -> &'static str {
        "add-remove-detour"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        if acg.model() != ConversionModel::Unrestricted {
            log::debug!("{} needs the unrestricted model", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        let log_hr = if rng.coin() {
            add_detour(acg, ctx, rng)?
        } else {
            remove_detour(acg, ctx, rng)?
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
