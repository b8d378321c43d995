use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, ConversionModel};

use super::{ensure_valid, Operator, ProposalContext};
use crate::sampling::{
    affected_region_prob, attach_edge, draw_affected_region, draw_restricted_region,
    edge_attachment_prob, restricted_region_prob,
};

/// Reversible-jump move that adds a freshly drawn conversion or removes a
/// uniformly chosen one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRemoveConversion;

impl AddRemoveConversion {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }

    fn add(
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
        let (region, region_log_p) = draw_affected_region(acg, ctx.delta(), rng);
        acg.add_conversion(edge.into_conversion(region))?;
        let count = acg.conversion_count() as f64;
        Ok(-count.ln() - (edge_log_p + region_log_p))
    }

    fn remove(
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let Some(id) = acg.choose_conversion(rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let count = acg.conversion_count() as f64;
        let Some(conv) = acg.conversion(id) else {
            return Ok(f64::NEG_INFINITY);
        };
        let log_hr = edge_attachment_prob(acg, ctx.population, conv)
            + affected_region_prob(acg, ctx.delta(), conv)
            + count.ln();
        acg.delete_conversion(id)?;
        Ok(log_hr)
    }

    fn add_restricted(
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let locus = acg.choose_locus(rng);
        let (edge, edge_log_p) = attach_edge(acg, ctx.population, rng)?;
        let Some((region, region_log_p)) = draw_restricted_region(acg, locus, ctx.delta(), rng)
        else {
            return Ok(f64::NEG_INFINITY);
        };
        acg.add_conversion(edge.into_conversion(region))?;
        let count = acg.locus_conversion_count(locus) as f64;
        Ok(-count.ln() - (edge_log_p + region_log_p))
    }

    fn remove_restricted(
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let locus = acg.choose_locus(rng);
        let conversions = acg.conversions(locus);
        if conversions.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let count = conversions.len() as f64;
        let conv = &conversions[rng.uniform_index(conversions.len())];
        let id = conv.id();
        let log_hr = edge_attachment_prob(acg, ctx.population, conv)
            + restricted_region_prob(acg, ctx.delta(), conv)
            + count.ln();
        acg.delete_conversion(id)?;
        Ok(log_hr)
    }
}

impl Operator for AddRemoveConversion {
    fn name(&self) -> &'static str {
        "add-remove-conversion"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let adding = rng.coin();
        let log_hr = match (acg.model(), adding) {
            (ConversionModel::Unrestricted, true) => Self::add(acg, ctx, rng)?,
            (ConversionModel::Unrestricted, false) => Self::remove(acg, ctx, rng)?,
            (ConversionModel::Restricted, true) => Self::add_restricted(acg, ctx, rng)?,
            (ConversionModel::Restricted, false) => Self::remove_restricted(acg, ctx, rng)?,
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected ({})", self.name(), if adding { "add" } else { "remove" });
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
