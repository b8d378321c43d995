//! Subtree surgery on the clonal frame and the endpoint repointing that
//! keeps conversions attached to the right edges.

use acg_core::errors::{AcgError, ErrorInfo};

use crate::frame::ClonalFrame;
use crate::graph::ConversionGraph;
use crate::ids::NodeId;

/// Walks from `node` toward the root until the edge above the current node
/// contains `height`.
pub fn reattach(frame: &ClonalFrame, node: NodeId, height: f64) -> NodeId {
    let mut current = node;
    while let Some(parent) = frame.parent(current) {
        if height <= frame.height(parent) {
            break;
        }
        current = parent;
    }
    current
}

impl ConversionGraph {
    /// Detaches the edge above `node` together with its parent.
    ///
    /// The sibling takes the parent's place, and conversions attached to the
    /// parent are moved onto the sibling. The parent is left parentless with
    /// `node` as its only child until [`ConversionGraph::connect_edge`].
    pub fn disconnect_edge(&mut self, node: NodeId) -> Result<(), AcgError> {
        let frame = self.frame();
        let parent = frame.parent(node).ok_or_else(|| surgery_error("detach-root", node))?;
        let sibling = frame
            .sibling(node)
            .ok_or_else(|| surgery_error("missing-sibling", node))?;
        let grandparent = frame.parent(parent);

        let frame = self.frame_mut();
        match grandparent {
            None => {
                frame.remove_child(parent, sibling);
                frame.set_root(sibling);
            }
            Some(grandparent) => {
                frame.remove_child(grandparent, parent);
                frame.remove_child(parent, sibling);
                frame.add_child(grandparent, sibling);
            }
        }

        for conv in self.conversions_mut() {
            if conv.node1 == parent {
                conv.node1 = sibling;
            }
            if conv.node2 == parent {
                conv.node2 = sibling;
            }
        }
        log::trace!("detached {parent} above {node}, {sibling} takes its place");
        Ok(())
    }

    /// Re-inserts the detached parent of `node` on the edge above `dest` at
    /// `time`. Conversions on `dest` above `time` move to the parent.
    pub fn connect_edge(&mut self, node: NodeId, dest: NodeId, time: f64) -> Result<(), AcgError> {
        let parent = self
            .frame()
            .parent(node)
            .ok_or_else(|| surgery_error("connect-orphan", node))?;
        let dest_parent = self.frame().parent(dest);

        let frame = self.frame_mut();
        match dest_parent {
            None => {
                frame.add_child(parent, dest);
                frame.set_root(parent);
            }
            Some(grandparent) => {
                frame.remove_child(grandparent, dest);
                frame.add_child(grandparent, parent);
                frame.add_child(parent, dest);
            }
        }
        frame.set_height(parent, time);

        for conv in self.conversions_mut() {
            if conv.node1 == dest && conv.height1 > time {
                conv.node1 = parent;
            }
            if conv.node2 == dest && conv.height2 > time {
                conv.node2 = parent;
            }
        }
        log::trace!("attached {parent} above {dest} at {time}");
        Ok(())
    }

    /// Re-runs [`reattach`] on every conversion endpoint.
    pub fn reattach_all(&mut self) {
        let (frame, conversions) = self.frame_and_conversions_mut();
        for conv in conversions.iter_mut().flatten() {
            conv.node1 = reattach(frame, conv.node1, conv.height1);
            conv.node2 = reattach(frame, conv.node2, conv.height2);
        }
    }
}

fn surgery_error(code: &str, node: NodeId) -> AcgError {
    AcgError::Graph(
        ErrorInfo::new(code, "clonal frame surgery on an unsuitable node")
            .with_context("node", node),
    )
}
