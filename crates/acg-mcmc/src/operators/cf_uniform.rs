use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_core::LOG_HALF;
use acg_graph::{ConversionGraph, ConversionModel, NodeId};

use super::cf_ops::{create_departures, remove_departures, Segment};
use super::{endpoints_where, ensure_valid, Operator, ProposalContext};

/// Moves the height of one internal clonal frame node.
///
/// Non-root nodes move uniformly between their oldest child and their
/// parent. Under the unrestricted model the root is also eligible and is
/// rescaled, with conversions created or removed on the stretch of frame the
/// move sweeps.
#[derive(Debug, Clone, Copy)]
pub struct CfUniform {
    scale_factor: f64,
    include_root: bool,
}

impl Default for CfUniform {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl CfUniform {
    /// Creates the operator with the root scale factor `s`, drawn from
    /// `[min(s, 1/s), max(s, 1/s)]`.
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            include_root: true,
        }
    }

    /// Enables or disables root moves. Root moves never happen under the
    /// restricted model.
    pub fn with_root(mut self, include_root: bool) -> Self {
        self.include_root = include_root;
        self
    }

    fn move_internal(
        acg: &mut ConversionGraph,
        node: NodeId,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let frame = acg.frame();
        let Some(upper) = frame.parent_height(node) else {
            return Ok(f64::NEG_INFINITY);
        };
        let lower = frame.max_child_height(node);
        let old = frame.height(node);
        let new = lower + rng.uniform() * (upper - lower);
        let mut children: Vec<NodeId> = frame.children(node).to_vec();
        children.sort_unstable();

        let mut log_hr = 0.0;
        if new > old {
            let lifted = endpoints_where(acg, |on, h| on == node && h < new);
            for endpoint in &lifted {
                let child = children[rng.uniform_index(children.len())];
                endpoint.set_node(acg, child);
            }
            log_hr -= lifted.len() as f64 * LOG_HALF;
        } else {
            let lowered = endpoints_where(acg, |on, h| children.contains(&on) && h > new);
            for endpoint in &lowered {
                endpoint.set_node(acg, node);
            }
            log_hr += lowered.len() as f64 * LOG_HALF;
        }
        acg.frame_mut().set_height(node, new);
        Ok(log_hr)
    }

    fn move_root(
        &self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let root = acg.root();
        let old = acg.frame().height(root);
        let low = self.scale_factor.min(1.0 / self.scale_factor);
        let factor = low + rng.uniform() * (1.0 / low - low);
        let new = old * factor;
        if new <= acg.frame().max_root_child_height() {
            return Ok(f64::NEG_INFINITY);
        }
        let mut children: Vec<NodeId> = acg.frame().children(root).to_vec();
        children.sort_unstable();
        let mut log_hr = -factor.ln();

        if new > old {
            let lowered = endpoints_where(acg, |on, h| on == root && h < new);
            for endpoint in &lowered {
                let child = children[rng.uniform_index(children.len())];
                endpoint.set_node(acg, child);
            }
            log_hr -= lowered.len() as f64 * LOG_HALF;
            acg.frame_mut().set_height(root, new);

            let segments = child_segments(&children, old, new);
            log_hr -= create_departures(acg, ctx, &segments, rng)?;
        } else {
            let segments = child_segments(&children, new, old);
            let removal = remove_departures(acg, ctx, &segments)?;
            if removal == f64::NEG_INFINITY {
                return Ok(f64::NEG_INFINITY);
            }
            log_hr += removal;
            let raised = endpoints_where(acg, |on, h| children.contains(&on) && h > new);
            for endpoint in &raised {
                endpoint.set_node(acg, root);
            }
            log_hr += raised.len() as f64 * LOG_HALF;
            acg.frame_mut().set_height(root, new);
        }
        Ok(log_hr)
    }
}

impl Operator for CfUniform {
    fn name(&self) -> &'static str {
        "cf-uniform"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let frame = acg.frame();
        let include_root = self.include_root && acg.model() == ConversionModel::Unrestricted;
        let candidates: Vec<NodeId> = frame
            .internal_nodes()
            .filter(|id| include_root || !frame.is_root(*id))
            .collect();
        if candidates.is_empty() {
            log::debug!("{}: no eligible internal node", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        let node = candidates[rng.uniform_index(candidates.len())];

        let log_hr = if acg.frame().is_root(node) {
            self.move_root(acg, ctx, rng)?
        } else {
            Self::move_internal(acg, node, rng)?
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected move of {node}", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}

fn child_segments(children: &[NodeId], lower: f64, upper: f64) -> Vec<Segment> {
    children
        .iter()
        .map(|child| Segment {
            node: *child,
            lower,
            upper,
        })
        .collect()
}
