//! Metropolis-Hastings graph-edit operators.
//!
//! Every operator edits the graph in place and returns the log Hastings
//! ratio of the move. `Ok(f64::NEG_INFINITY)` is an ordinary rejection that
//! the host handles by restoring its snapshot; `Err` means the operator broke
//! a graph invariant and the chain must stop.

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::population::PopulationFunction;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, ConversionId, NodeId};

use crate::params::ModelParams;

mod add_remove;
mod cf_ops;
mod cf_swap;
mod cf_uniform;
mod cf_wilson_balding;
mod detour;
mod edge_moves;
mod merge_split;
mod redundant;
mod region_shift;
mod replace;
mod scaler;

pub use add_remove::AddRemoveConversion;
pub use cf_swap::ClonalFrameConversionSwap;
pub use cf_uniform::CfUniform;
pub use cf_wilson_balding::CfWilsonBalding;
pub use detour::AddRemoveDetour;
pub use edge_moves::{ConvertedEdgeFlip, ConvertedEdgeHop, ConvertedEdgeSlide};
pub use merge_split::{merge_proposal, split_proposal, MergeSplitConversion};
pub use redundant::AddRemoveRedundantConversion;
pub use region_shift::{ConvertedRegionBoundaryShift, ConvertedRegionShift, PairBoundaryShift};
pub use replace::ReplaceConversion;
pub use scaler::AcgScaler;

/// Read-only model state an operator needs besides the graph itself.
#[derive(Debug, Clone, Copy)]
pub struct ProposalContext<'a> {
    /// Population function of the coalescent.
    pub population: &'a dyn PopulationFunction,
    /// Conversion rate and tract length.
    pub params: ModelParams,
}

impl<'a> ProposalContext<'a> {
    /// Bundles the population function and model parameters.
    pub fn new(population: &'a dyn PopulationFunction, params: ModelParams) -> Self {
        Self { population, params }
    }

    /// Conversion rate.
    pub fn rho(&self) -> f64 {
        self.params.rho
    }

    /// Mean tract length.
    pub fn delta(&self) -> f64 {
        self.params.delta
    }
}

/// A reversible graph edit.
pub trait Operator {
    /// Stable name used for acceptance bookkeeping.
    fn name(&self) -> &'static str;

    /// Applies the move and returns its log Hastings ratio.
    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError>;
}

/// Turns a failed post-move validation into an operator error.
pub(crate) fn ensure_valid(acg: &ConversionGraph, operator: &str) -> Result<(), AcgError> {
    acg.validate().map_err(|cause| {
        log::warn!("{operator} left the graph invalid: {cause}");
        AcgError::Operator(
            ErrorInfo::new("invalid-state", "operator produced an invalid graph")
                .with_context("operator", operator)
                .with_context("cause", cause.code()),
        )
    })
}

/// Which end of a conversion an endpoint reference designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Departure,
    Arrival,
}

/// One attachment point of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub conv: ConversionId,
    pub side: Side,
}

impl Endpoint {
    pub fn location(&self, acg: &ConversionGraph) -> Option<(NodeId, f64)> {
        let conv = acg.conversion(self.conv)?;
        Some(match self.side {
            Side::Departure => (conv.node1, conv.height1),
            Side::Arrival => (conv.node2, conv.height2),
        })
    }

    pub fn set_node(&self, acg: &mut ConversionGraph, node: NodeId) {
        if let Some(conv) = acg.conversion_mut(self.conv) {
            match self.side {
                Side::Departure => conv.node1 = node,
                Side::Arrival => conv.node2 = node,
            }
        }
    }

    pub fn set_location(&self, acg: &mut ConversionGraph, node: NodeId, height: f64) {
        if let Some(conv) = acg.conversion_mut(self.conv) {
            match self.side {
                Side::Departure => {
                    conv.node1 = node;
                    conv.height1 = height;
                }
                Side::Arrival => {
                    conv.node2 = node;
                    conv.height2 = height;
                }
            }
        }
    }
}

/// Every endpoint whose `(node, height)` satisfies `keep`.
pub(crate) fn endpoints_where(
    acg: &ConversionGraph,
    mut keep: impl FnMut(NodeId, f64) -> bool,
) -> Vec<Endpoint> {
    let mut out = Vec::new();
    for conv in acg.all_conversions() {
        if keep(conv.node1, conv.height1) {
            out.push(Endpoint {
                conv: conv.id(),
                side: Side::Departure,
            });
        }
        if keep(conv.node2, conv.height2) {
            out.push(Endpoint {
                conv: conv.id(),
                side: Side::Arrival,
            });
        }
    }
    out
}

/// Whether any conversion departs from the root edge.
pub(crate) fn departs_from_root(acg: &ConversionGraph) -> bool {
    let root = acg.root();
    acg.all_conversions().any(|c| c.node1 == root)
}
