use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

use crate::ids::NodeId;

/// Arena entry of the clonal frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    height: f64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    label: Option<String>,
}

impl Node {
    /// Node height (time before present).
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Parent link, `None` for the root or a detached node.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child links.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Optional taxon label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Rooted binary tree stored as an arena of [`Node`]s.
///
/// The root is tracked explicitly. Surgery helpers leave the tree in a
/// transient state (a detached parent with a single child); callers restore
/// binary structure before calling [`ClonalFrame::validate`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClonalFrame {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ClonalFrame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sampled leaf.
    pub fn add_leaf(&mut self, height: f64, label: impl Into<String>) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len());
        self.nodes.push(Node {
            height,
            parent: None,
            children: Vec::new(),
            label: Some(label.into()),
        });
        if self.nodes.len() == 1 {
            self.root = id;
        }
        id
    }

    /// Joins two parentless nodes under a new internal node, which becomes the root.
    pub fn join(&mut self, left: NodeId, right: NodeId, height: f64) -> Result<NodeId, AcgError> {
        for child in [left, right] {
            self.check_id(child)?;
            if self.nodes[child.index()].parent.is_some() {
                return Err(AcgError::Graph(
                    ErrorInfo::new("already-attached", "join expects parentless nodes")
                        .with_context("node", child),
                ));
            }
        }
        if left == right {
            return Err(AcgError::Graph(
                ErrorInfo::new("self-join", "cannot join a node with itself")
                    .with_context("node", left),
            ));
        }
        let id = NodeId::from_raw(self.nodes.len());
        self.nodes.push(Node {
            height,
            parent: None,
            children: vec![left, right],
            label: None,
        });
        self.nodes[left.index()].parent = Some(id);
        self.nodes[right.index()].parent = Some(id);
        self.root = id;
        Ok(id)
    }

    /// Rebuilds a frame from `(height, parent, label)` records.
    ///
    /// Children are derived from the parent links in index order.
    pub fn from_records(
        records: impl IntoIterator<Item = (f64, Option<usize>, Option<String>)>,
    ) -> Result<Self, AcgError> {
        let mut nodes: Vec<Node> = records
            .into_iter()
            .map(|(height, parent, label)| Node {
                height,
                parent: parent.map(NodeId::from_raw),
                children: Vec::new(),
                label,
            })
            .collect();
        for idx in 0..nodes.len() {
            if let Some(parent) = nodes[idx].parent {
                if parent.index() >= nodes.len() || parent.index() == idx {
                    return Err(AcgError::Graph(
                        ErrorInfo::new("dangling-parent", "parent index out of range")
                            .with_context("node", idx)
                            .with_context("parent", parent.index()),
                    ));
                }
                nodes[parent.index()].children.push(NodeId::from_raw(idx));
            }
        }
        let mut frame = Self {
            nodes,
            root: NodeId::default(),
        };
        frame.refresh_root();
        frame.validate()?;
        Ok(frame)
    }

    fn check_id(&self, id: NodeId) -> Result<(), AcgError> {
        if id.index() >= self.nodes.len() {
            return Err(AcgError::Graph(
                ErrorInfo::new("unknown-node", "node id out of range")
                    .with_context("node", id)
                    .with_context("node_count", self.nodes.len()),
            ));
        }
        Ok(())
    }

    /// Arena entry for `id`.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.children.is_empty()).count()
    }

    /// Iterates over every node id.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::from_raw)
    }

    /// Iterates over every node except the root.
    pub fn non_root_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(move |id| *id != self.root)
    }

    /// Iterates over internal nodes, root included.
    pub fn internal_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(move |id| !self.is_leaf(*id))
    }

    /// Root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether `id` is the root.
    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Whether `id` has no children.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.index()].children.is_empty()
    }

    /// Height of `id`.
    pub fn height(&self, id: NodeId) -> f64 {
        self.nodes[id.index()].height
    }

    /// Parent of `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Children of `id`.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Label of `id`, if any.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.index()].label.as_deref()
    }

    /// Height of the parent, `None` at the root.
    pub fn parent_height(&self, id: NodeId) -> Option<f64> {
        self.parent(id).map(|p| self.height(p))
    }

    /// The other child of `id`'s parent.
    pub fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.children(parent).iter().copied().find(|c| *c != id)
    }

    /// Largest child height, or the node's own height for a leaf.
    pub fn max_child_height(&self, id: NodeId) -> f64 {
        if self.is_leaf(id) {
            return self.height(id);
        }
        self.children(id)
            .iter()
            .map(|c| self.height(*c))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Largest height among the root's children.
    pub fn max_root_child_height(&self) -> f64 {
        self.max_child_height(self.root)
    }

    /// Branch length above `id` (zero at the root).
    pub fn branch_length(&self, id: NodeId) -> f64 {
        self.parent_height(id).map_or(0.0, |h| h - self.height(id))
    }

    /// Sum of all non-root branch lengths.
    pub fn total_length(&self) -> f64 {
        self.node_ids().map(|id| self.branch_length(id)).sum()
    }

    /// Whether `ancestor` lies on the path from `node` to the root (inclusive).
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Sets the height of `id` without checking ordering.
    pub fn set_height(&mut self, id: NodeId, height: f64) {
        self.nodes[id.index()].height = height;
    }

    /// Appends `child` to `parent` and sets the back link.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Removes `child` from `parent` and clears the back link.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.retain(|c| *c != child);
        if self.nodes[child.index()].parent == Some(parent) {
            self.nodes[child.index()].parent = None;
        }
    }

    /// Marks `id` as the root.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = id;
    }

    /// Recomputes the root as the first parentless node with children, or
    /// the only node of a single-leaf frame.
    pub fn refresh_root(&mut self) {
        if let Some(idx) = self
            .nodes
            .iter()
            .position(|n| n.parent.is_none() && !n.children.is_empty())
            .or_else(|| (self.nodes.len() == 1).then_some(0))
        {
            self.root = NodeId::from_raw(idx);
        }
    }

    /// Checks the structural invariants: one root, binary internal nodes,
    /// parent/child symmetry and non-decreasing heights toward the root.
    pub fn validate(&self) -> Result<(), AcgError> {
        if self.nodes.is_empty() {
            return Err(AcgError::Graph(ErrorInfo::new(
                "empty-frame",
                "clonal frame has no nodes",
            )));
        }
        self.check_id(self.root)?;
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|idx| self.nodes[*idx].parent.is_none())
            .collect();
        if roots.len() != 1 || roots[0] != self.root.index() {
            return Err(AcgError::Graph(
                ErrorInfo::new("root-mismatch", "frame must have exactly one parentless root")
                    .with_context("roots", roots.len())
                    .with_context("root", self.root),
            ));
        }
        for id in self.node_ids() {
            let node = self.node(id);
            if !node.height.is_finite() || node.height < 0.0 {
                return Err(AcgError::Graph(
                    ErrorInfo::new("invalid-height", "node heights must be finite and non-negative")
                        .with_context("node", id)
                        .with_context("height", node.height),
                ));
            }
            if !(node.children.is_empty() || node.children.len() == 2) {
                return Err(AcgError::Graph(
                    ErrorInfo::new("non-binary", "internal nodes must have two children")
                        .with_context("node", id)
                        .with_context("children", node.children.len()),
                ));
            }
            for child in &node.children {
                self.check_id(*child)?;
                if self.parent(*child) != Some(id) {
                    return Err(AcgError::Graph(
                        ErrorInfo::new("asymmetric-link", "child does not point back to parent")
                            .with_context("parent", id)
                            .with_context("child", child),
                    ));
                }
                if self.height(*child) > node.height {
                    return Err(AcgError::Graph(
                        ErrorInfo::new("height-order", "child is older than its parent")
                            .with_context("parent", id)
                            .with_context("child", child),
                    ));
                }
            }
            if let Some(parent) = node.parent {
                self.check_id(parent)?;
                if !self.children(parent).contains(&id) {
                    return Err(AcgError::Graph(
                        ErrorInfo::new("asymmetric-link", "parent does not list child")
                            .with_context("parent", parent)
                            .with_context("child", id),
                    ));
                }
            }
        }
        Ok(())
    }
}
