use serde::{Deserialize, Serialize};

use crate::ids::{ConversionId, NodeId};

/// A conversion edge from `(node1, height1)` to `(node2, height2)` carrying
/// the inclusive site interval `[start, end]` of one locus.
///
/// The endpoints are freely editable. The locus and region are owned by the
/// graph because they determine the conversion's position in the per-locus
/// ordering; change them through [`crate::ConversionGraph::set_conversion_region`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    id: ConversionId,
    locus: usize,
    start: usize,
    end: usize,
    /// Lineage the converted tract departs from.
    pub node1: NodeId,
    /// Departure height.
    pub height1: f64,
    /// Lineage the converted tract attaches to.
    pub node2: NodeId,
    /// Arrival height.
    pub height2: f64,
}

impl Conversion {
    /// Creates an unregistered conversion.
    pub fn new(
        locus: usize,
        start: usize,
        end: usize,
        node1: NodeId,
        height1: f64,
        node2: NodeId,
        height2: f64,
    ) -> Self {
        Self {
            id: ConversionId::UNASSIGNED,
            locus,
            start,
            end,
            node1,
            height1,
            node2,
            height2,
        }
    }

    /// Identity assigned by the owning graph.
    pub fn id(&self) -> ConversionId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: ConversionId) {
        self.id = id;
    }

    /// Locus index.
    pub fn locus(&self) -> usize {
        self.locus
    }

    /// First converted site.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last converted site.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of converted sites; zero for an inverted interval, which the
    /// graph refuses to register.
    pub fn site_count(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub(crate) fn set_region(&mut self, start: usize, end: usize) {
        self.start = start;
        self.end = end;
    }

    /// Copy of this conversion with a different region, left unregistered.
    pub fn with_region(&self, locus: usize, start: usize, end: usize) -> Self {
        Self {
            id: ConversionId::UNASSIGNED,
            locus,
            start,
            end,
            ..self.clone()
        }
    }

    /// Whether the two conversions share both attachment lineages.
    pub fn same_edges(&self, other: &Conversion) -> bool {
        self.node1 == other.node1 && self.node2 == other.node2
    }
}
