use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_core::LOG_HALF;
use acg_graph::{ClonalFrame, ConversionGraph, ConversionModel, NodeId};

use super::cf_ops::{
    ancestral_endpoints, collapse_onto, create_departures, expand_selection, remove_departures,
    Segment,
};
use super::{endpoints_where, ensure_valid, Operator, ProposalContext};

/// Subtree prune-and-regraft of the clonal frame.
///
/// The edge above a random node is detached and reattached at a random
/// point of the remaining tree. Conversion endpoints on the pruned lineage
/// above the new junction collapse onto the lineage it joins; endpoints on
/// the joined lineage below the old junction are claimed by the pruned
/// lineage with probability one half each. Moves that make the pruned
/// parent the root draw its height from an exponential and create or remove
/// the conversions departing above the rest of the tree.
#[derive(Debug, Clone, Copy)]
pub struct CfWilsonBalding {
    alpha: f64,
}

impl Default for CfWilsonBalding {
    fn default() -> Self {
        Self { alpha: 0.1 }
    }
}

/// Edge above `node` in the tree left once `src` and its parent are pruned.
/// `None` means the edge extends to infinity.
fn remnant_parent_height(frame: &ClonalFrame, pruned_parent: NodeId, node: NodeId) -> Option<f64> {
    let parent = frame.parent(node)?;
    if parent == pruned_parent {
        frame.parent_height(pruned_parent)
    } else {
        Some(frame.height(parent))
    }
}

fn destinations(frame: &ClonalFrame, src: NodeId) -> Vec<NodeId> {
    let Some(pruned_parent) = frame.parent(src) else {
        return Vec::new();
    };
    let floor = frame.height(src);
    frame
        .node_ids()
        .filter(|id| *id != pruned_parent && !frame.is_ancestor(src, *id))
        .filter(|id| remnant_parent_height(frame, pruned_parent, *id).map_or(true, |h| h > floor))
        .collect()
}

impl CfWilsonBalding {
    /// Creates the operator; `alpha` scales the mean of the exponential
    /// height drawn for a new root.
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    fn root_height_log_p(&self, floor: f64, height: f64) -> f64 {
        let span = self.alpha * floor;
        -span.ln() - (height - floor) / span
    }
}

impl Operator for CfWilsonBalding {
    fn name(&self) -> &'static str {
        "cf-wilson-balding"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let restricted = acg.model() == ConversionModel::Restricted;
        let frame = acg.frame();
        let sources: Vec<NodeId> = frame.non_root_nodes().collect();
        if sources.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let src = sources[rng.uniform_index(sources.len())];
        let (Some(parent), Some(sibling)) = (frame.parent(src), frame.sibling(src)) else {
            return Ok(f64::NEG_INFINITY);
        };
        let candidates = destinations(frame, src);
        if candidates.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let dest = candidates[rng.uniform_index(candidates.len())];

        let src_height = frame.height(src);
        let old_time = frame.height(parent);
        let parent_was_root = frame.is_root(parent);
        let dest_top = remnant_parent_height(frame, parent, dest);
        let parent_becomes_root = dest_top.is_none();
        if restricted && (parent_was_root || parent_becomes_root) {
            log::debug!("{}: root variants need the unrestricted model", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        let remnant_root = if parent_was_root { sibling } else { frame.root() };
        let remnant_height = frame.height(remnant_root);

        // New attachment time and its density.
        let mut log_hr = 0.0;
        let new_time = match dest_top {
            None => {
                let floor = src_height.max(frame.height(dest));
                if !(self.alpha * floor > 0.0) {
                    return Ok(f64::NEG_INFINITY);
                }
                let time = floor + rng.exponential(1.0 / (self.alpha * floor));
                log_hr -= self.root_height_log_p(floor, time);
                time
            }
            Some(top) => {
                let lower = src_height.max(frame.height(dest));
                let time = lower + rng.uniform() * (top - lower);
                log_hr += (top - lower).ln();
                time
            }
        };

        // Density of the reverse draw, which reattaches above the sibling.
        if parent_was_root {
            let floor = src_height.max(frame.height(sibling));
            if !(self.alpha * floor > 0.0) {
                return Ok(f64::NEG_INFINITY);
            }
            log_hr += self.root_height_log_p(floor, old_time);
        } else {
            let lower = src_height.max(frame.height(sibling));
            let top = frame.parent_height(parent).unwrap_or(old_time);
            log_hr -= (top - lower).ln();
        }
        let forward_choices = candidates.len() as f64;

        if parent_was_root {
            let segments = [
                Segment {
                    node: src,
                    lower: src_height.max(remnant_height),
                    upper: old_time,
                },
                Segment {
                    node: remnant_root,
                    lower: remnant_height,
                    upper: old_time,
                },
            ];
            let removal = remove_departures(acg, ctx, &segments)?;
            if removal == f64::NEG_INFINITY {
                return Ok(f64::NEG_INFINITY);
            }
            log_hr += removal;
        }

        let collapsing = if new_time < old_time {
            endpoints_where(acg, |on, h| on == src && h > new_time)
        } else {
            Vec::new()
        };
        let expanding = if new_time > old_time {
            let candidates = ancestral_endpoints(acg, parent, old_time, new_time);
            log_hr -= candidates.len() as f64 * LOG_HALF;
            expand_selection(candidates, rng)
        } else {
            Vec::new()
        };

        acg.disconnect_edge(src)?;
        acg.connect_edge(src, dest, new_time)?;
        collapse_onto(acg, &collapsing, parent);
        for endpoint in &expanding {
            endpoint.set_node(acg, src);
        }
        if new_time < old_time {
            let claimable = ancestral_endpoints(acg, parent, new_time, old_time);
            log_hr += claimable.len() as f64 * LOG_HALF;
        }

        let reverse_choices = destinations(acg.frame(), src).len() as f64;
        log_hr += forward_choices.ln() - reverse_choices.ln();

        if parent_becomes_root {
            let dest_height = acg.frame().height(dest);
            let segments = [
                Segment {
                    node: src,
                    lower: src_height.max(dest_height),
                    upper: new_time,
                },
                Segment {
                    node: dest,
                    lower: dest_height,
                    upper: new_time,
                },
            ];
            log_hr -= create_departures(acg, ctx, &segments, rng)?;
        }

        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
