use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

use crate::frame::ClonalFrame;
use crate::ids::NodeId;

/// Kind of clonal frame event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfEventKind {
    /// A sampled lineage enters.
    Sample,
    /// Two lineages merge.
    Coalescence,
}

/// One event of the clonal frame, seen backwards in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CfEvent {
    /// Event height.
    pub height: f64,
    /// Event kind.
    pub kind: CfEventKind,
    /// Node realising the event.
    pub node: NodeId,
    /// Number of lineages immediately above the event.
    pub lineages: usize,
}

/// Clonal frame events in increasing height order, ending with the root.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CfEventList {
    events: Vec<CfEvent>,
}

impl CfEventList {
    /// Builds the event list of a frame.
    pub fn from_frame(frame: &ClonalFrame) -> Self {
        let mut order: Vec<NodeId> = frame.node_ids().collect();
        // Samples sort before coalescences at equal heights.
        order.sort_by(|a, b| {
            frame
                .height(*a)
                .total_cmp(&frame.height(*b))
                .then_with(|| frame.is_leaf(*b).cmp(&frame.is_leaf(*a)))
        });

        let mut lineages = 0usize;
        let events = order
            .into_iter()
            .map(|node| {
                let kind = if frame.is_leaf(node) {
                    lineages += 1;
                    CfEventKind::Sample
                } else {
                    lineages = lineages.saturating_sub(1);
                    CfEventKind::Coalescence
                };
                CfEvent {
                    height: frame.height(node),
                    kind,
                    node,
                    lineages,
                }
            })
            .collect();
        Self { events }
    }

    /// Events in height order.
    pub fn events(&self) -> &[CfEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of the last event strictly below `t`, clamped to zero.
    pub fn interval_containing(&self, t: f64) -> usize {
        self.events
            .partition_point(|e| e.height < t)
            .saturating_sub(1)
    }

    /// Height of the event closing interval `idx`, `None` for the last interval.
    pub fn interval_end(&self, idx: usize) -> Option<f64> {
        self.events.get(idx + 1).map(|e| e.height)
    }

    /// Change times for a skyline whose groups span `group_sizes[i]`
    /// consecutive coalescences each.
    ///
    /// The first boundary is zero and each later boundary is the height of
    /// the coalescence closing the previous group.
    pub fn skyline_boundaries(&self, group_sizes: &[usize]) -> Result<Vec<f64>, AcgError> {
        let coalescences: Vec<f64> = self
            .events
            .iter()
            .filter(|e| e.kind == CfEventKind::Coalescence)
            .map(|e| e.height)
            .collect();
        let total: usize = group_sizes.iter().sum();
        if group_sizes.is_empty() || group_sizes.contains(&0) || total != coalescences.len() {
            return Err(AcgError::Model(
                ErrorInfo::new(
                    "skyline-groups",
                    "group sizes must be positive and cover every coalescence",
                )
                .with_context("groups", total)
                .with_context("coalescences", coalescences.len()),
            ));
        }

        let mut boundaries = Vec::with_capacity(group_sizes.len());
        boundaries.push(0.0);
        let mut seen = 0usize;
        for size in &group_sizes[..group_sizes.len() - 1] {
            seen += size;
            boundaries.push(coalescences[seen - 1]);
        }
        Ok(boundaries)
    }
}
