//! Moves that relocate one endpoint of a conversion edge while leaving the
//! clonal frame and every converted region untouched.

use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_core::LOG_HALF;
use acg_graph::{ConversionGraph, NodeId};

use super::{ensure_valid, Endpoint, Operator, ProposalContext, Side};

const DEFAULT_WINDOW: f64 = 0.1;

fn choose_endpoint(acg: &ConversionGraph, departure: bool, rng: &mut RngHandle) -> Option<Endpoint> {
    let conv = acg.choose_conversion(rng)?;
    let side = if departure {
        Side::Departure
    } else {
        Side::Arrival
    };
    Some(Endpoint { conv, side })
}

/// Slides one endpoint up or down by a uniform offset, following the frame
/// through coalescences on the way.
///
/// Walking down picks a child at random at each node passed; walking up is
/// deterministic. The window is a fraction of the current root height.
#[derive(Debug, Clone, Copy)]
pub struct ConvertedEdgeSlide {
    window: f64,
}

impl Default for ConvertedEdgeSlide {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl ConvertedEdgeSlide {
    /// `window` is the slide width as a fraction of the root height.
    pub fn new(window: f64) -> Self {
        Self { window }
    }

    fn slide(acg: &mut ConversionGraph, window: f64, rng: &mut RngHandle) -> Result<f64, AcgError> {
        let departure = rng.coin();
        let Some(endpoint) = choose_endpoint(acg, departure, rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let Some(conv) = acg.conversion(endpoint.conv) else {
            return Ok(f64::NEG_INFINITY);
        };
        let (height1, height2) = (conv.height1, conv.height2);
        let Some((node, old_height)) = endpoint.location(acg) else {
            return Ok(f64::NEG_INFINITY);
        };

        let frame = acg.frame();
        let root_height = frame.height(frame.root());
        let new_height = old_height + (rng.uniform() - 0.5) * window * root_height;
        let out_of_range = if departure {
            new_height > height2 || new_height > root_height
        } else {
            new_height < height1
        };
        if out_of_range {
            return Ok(f64::NEG_INFINITY);
        }

        let mut log_hr = 0.0;
        let mut below = node;
        if new_height < old_height {
            while new_height < frame.height(below) {
                let children = frame.children(below);
                if children.is_empty() {
                    return Ok(f64::NEG_INFINITY);
                }
                below = children[rng.uniform_index(children.len())];
                log_hr -= LOG_HALF;
            }
        } else {
            while let Some(parent) = frame.parent(below) {
                if new_height <= frame.height(parent) {
                    break;
                }
                below = parent;
                log_hr += LOG_HALF;
            }
        }
        if departure && frame.is_root(below) {
            return Ok(f64::NEG_INFINITY);
        }

        endpoint.set_location(acg, below, new_height);
        Ok(log_hr)
    }
}

impl Operator for ConvertedEdgeSlide {
    fn name(&self) -> &'static str {
        "converted-edge-slide"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let log_hr = Self::slide(acg, self.window, rng)?;
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}

/// Moves one endpoint sideways onto another frame edge alive at the same
/// height.
///
/// Arrivals on the root edge stay put; their departure always moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertedEdgeHop;

impl ConvertedEdgeHop {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

/// Non-root edges other than `skip` whose span contains `height`.
fn edges_alive_at(acg: &ConversionGraph, height: f64, skip: NodeId) -> Vec<NodeId> {
    let frame = acg.frame();
    frame
        .non_root_nodes()
        .filter(|&node| node != skip)
        .filter(|&node| {
            frame.height(node) <= height
                && frame.parent_height(node).is_some_and(|top| height <= top)
        })
        .collect()
}

impl Operator for ConvertedEdgeHop {
    fn name(&self) -> &'static str {
        "converted-edge-hop"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let Some(id) = acg.choose_conversion(rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let Some(conv) = acg.conversion(id) else {
            return Ok(f64::NEG_INFINITY);
        };
        let departure = acg.frame().is_root(conv.node2) || rng.coin();
        let endpoint = Endpoint {
            conv: id,
            side: if departure {
                Side::Departure
            } else {
                Side::Arrival
            },
        };
        let Some((node, height)) = endpoint.location(acg) else {
            return Ok(f64::NEG_INFINITY);
        };
        let candidates = edges_alive_at(acg, height, node);
        if candidates.is_empty() {
            log::debug!("{} found no edge at height {height}", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        endpoint.set_node(acg, candidates[rng.uniform_index(candidates.len())]);
        ensure_valid(acg, self.name())?;
        Ok(0.0)
    }
}

/// Exchanges the departure and arrival edges of a conversion when each
/// height also lies on the other edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertedEdgeFlip;

impl ConvertedEdgeFlip {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

impl Operator for ConvertedEdgeFlip {
    fn name(&self) -> &'static str {
        "converted-edge-flip"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let Some(id) = acg.choose_conversion(rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let Some(conv) = acg.conversion(id) else {
            return Ok(f64::NEG_INFINITY);
        };
        let (node1, height1, node2, height2) = (conv.node1, conv.height1, conv.node2, conv.height2);
        let frame = acg.frame();
        let on_edge = |node: NodeId, height: f64| {
            frame.height(node) <= height
                && frame.parent_height(node).is_some_and(|top| height <= top)
        };
        if node1 == node2 || !on_edge(node2, height1) || !on_edge(node1, height2) {
            return Ok(f64::NEG_INFINITY);
        }
        if let Some(conv) = acg.conversion_mut(id) {
            conv.node1 = node2;
            conv.node2 = node1;
        }
        ensure_valid(acg, self.name())?;
        Ok(0.0)
    }
}
