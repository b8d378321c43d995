use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, NodeId};

use super::{Operator, ProposalContext};

/// Multiplies every internal node height and every conversion endpoint
/// height by a common factor drawn uniformly from `[s, 1/s]`.
///
/// In root-only mode just the root height moves, together with the
/// endpoints on the edges that meet at the root.
#[derive(Debug, Clone, Copy)]
pub struct AcgScaler {
    scale_factor: f64,
    root_only: bool,
}

impl Default for AcgScaler {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl AcgScaler {
    /// Creates a scaler over the whole graph.
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            root_only: false,
        }
    }

    /// Restricts the move to the root and the edges that meet at it.
    pub fn with_root_only(mut self, root_only: bool) -> Self {
        self.root_only = root_only;
        self
    }
}

impl Operator for AcgScaler {
    fn name(&self) -> &'static str {
        "acg-scaler"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let low = self.scale_factor.min(1.0 / self.scale_factor);
        let f = low + rng.uniform() * (1.0 / low - low);

        let frame = acg.frame();
        let root = frame.root();
        let nodes: Vec<NodeId> = if self.root_only {
            vec![root]
        } else {
            frame.internal_nodes().collect()
        };
        let touches_root = |node: NodeId| frame.is_root(node) || frame.parent(node) == Some(root);
        let root_only = self.root_only;
        let moved: Vec<(bool, bool)> = acg
            .all_conversions()
            .map(|c| {
                (
                    !root_only || touches_root(c.node1),
                    !root_only || touches_root(c.node2),
                )
            })
            .collect();

        let mut scaled = nodes.len();
        for node in nodes {
            let height = acg.frame().height(node);
            acg.frame_mut().set_height(node, height * f);
        }
        for (conv, (departure, arrival)) in acg.conversions_mut().zip(moved) {
            if departure {
                conv.height1 *= f;
                scaled += 1;
            }
            if arrival {
                conv.height2 *= f;
                scaled += 1;
            }
        }

        if !acg.is_valid() {
            log::debug!("{} rejected scale {f}", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        Ok((scaled as f64 - 2.0) * f.ln())
    }
}
