use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cf_events::CfEventKind;
use crate::graph::ConversionGraph;
use crate::ids::{ConversionId, NodeId};

/// Node of a marginal genealogy.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalNode {
    /// Node height.
    pub height: f64,
    /// Child indices into [`MarginalTree::nodes`].
    pub children: Vec<usize>,
    /// Clonal frame node realising this node, if it is not a conversion arrival.
    pub cf_node: Option<NodeId>,
    /// Leaf label.
    pub label: Option<String>,
}

/// Genealogy followed by the sites of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalTree {
    nodes: Vec<MarginalNode>,
    root: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ConversionEvent {
    height: f64,
    departure: bool,
    id: ConversionId,
    node1: NodeId,
    node2: NodeId,
}

impl MarginalTree {
    /// Replays clonal frame events together with the departures and arrivals
    /// of the `active` conversions, from the present toward the root.
    pub fn build(acg: &ConversionGraph, active: &BTreeSet<ConversionId>) -> Self {
        let frame = acg.frame();
        let mut conv_events: Vec<ConversionEvent> = acg
            .all_conversions()
            .filter(|c| active.contains(&c.id()))
            .flat_map(|c| {
                [true, false].map(|departure| ConversionEvent {
                    height: if departure { c.height1 } else { c.height2 },
                    departure,
                    id: c.id(),
                    node1: c.node1,
                    node2: c.node2,
                })
            })
            .collect();
        conv_events.sort_by(|a, b| a.height.total_cmp(&b.height));

        let mut nodes: Vec<MarginalNode> = Vec::new();
        let mut cf_lineages: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut conv_lineages: BTreeMap<ConversionId, usize> = BTreeMap::new();

        let events = acg.cf_events().events();
        let mut next_conv = 0usize;
        for (idx, event) in events.iter().enumerate() {
            match event.kind {
                CfEventKind::Sample => {
                    nodes.push(MarginalNode {
                        height: event.height,
                        children: Vec::new(),
                        cf_node: Some(event.node),
                        label: frame.label(event.node).map(str::to_owned),
                    });
                    cf_lineages.insert(event.node, nodes.len() - 1);
                }
                CfEventKind::Coalescence => {
                    let children = frame.children(event.node);
                    let present: Vec<usize> = children
                        .iter()
                        .filter_map(|c| cf_lineages.remove(c))
                        .collect();
                    match present.as_slice() {
                        [left, right] => {
                            nodes.push(MarginalNode {
                                height: event.height,
                                children: vec![*left, *right],
                                cf_node: Some(event.node),
                                label: None,
                            });
                            cf_lineages.insert(event.node, nodes.len() - 1);
                        }
                        [single] => {
                            cf_lineages.insert(event.node, *single);
                        }
                        _ => {}
                    }
                }
            }

            let upper = events.get(idx + 1).map(|e| e.height);
            while next_conv < conv_events.len()
                && upper.map_or(true, |h| conv_events[next_conv].height < h)
            {
                let conv = conv_events[next_conv];
                next_conv += 1;
                if conv.departure {
                    if let Some(lineage) = cf_lineages.remove(&conv.node1) {
                        conv_lineages.insert(conv.id, lineage);
                    }
                    continue;
                }
                let Some(carried) = conv_lineages.remove(&conv.id) else {
                    continue;
                };
                match cf_lineages.get(&conv.node2).copied() {
                    Some(resident) => {
                        nodes.push(MarginalNode {
                            height: conv.height,
                            children: vec![resident, carried],
                            cf_node: None,
                            label: None,
                        });
                        cf_lineages.insert(conv.node2, nodes.len() - 1);
                    }
                    None => {
                        cf_lineages.insert(conv.node2, carried);
                    }
                }
            }
        }

        let root = cf_lineages.get(&frame.root()).copied();
        Self { nodes, root }
    }

    /// Arena of marginal nodes.
    pub fn nodes(&self) -> &[MarginalNode] {
        &self.nodes
    }

    /// Root index.
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Root height.
    pub fn root_height(&self) -> Option<f64> {
        self.root.map(|r| self.nodes[r].height)
    }

    /// Number of leaves reachable from the root.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.children.is_empty() {
                count += 1;
            }
            stack.extend(node.children.iter().copied());
        }
        count
    }

    fn write_node(&self, idx: usize, parent_height: Option<f64>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.nodes[idx];
        if !node.children.is_empty() {
            write!(f, "(")?;
            for (pos, child) in node.children.iter().enumerate() {
                if pos > 0 {
                    write!(f, ",")?;
                }
                self.write_node(*child, Some(node.height), f)?;
            }
            write!(f, ")")?;
        }
        if let Some(label) = &node.label {
            write!(f, "{label}")?;
        }
        if let Some(h) = parent_height {
            write!(f, ":{}", h - node.height)?;
        }
        Ok(())
    }
}

impl fmt::Display for MarginalTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = self.root {
            self.write_node(root, None, f)?;
        }
        write!(f, ";")
    }
}
