use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node inside the clonal frame arena.
///
/// Ids are stable for the life of a graph: topology edits only rewire
/// parent/child links, never renumber nodes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Creates an id from an arena index.
    pub const fn from_raw(index: usize) -> Self {
        Self(index)
    }

    /// Returns the arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identity of a conversion, assigned by the graph on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionId(u64);

impl ConversionId {
    /// Placeholder carried by conversions that were never inserted.
    pub const UNASSIGNED: ConversionId = ConversionId(u64::MAX);

    /// Creates an id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConversionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNASSIGNED {
            write!(f, "c?")
        } else {
            write!(f, "c{}", self.0)
        }
    }
}
