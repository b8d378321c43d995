#![deny(missing_docs)]
#![doc = "Ancestral conversion graph data model: the clonal frame arena, conversions and their per-locus ordering, clonal frame events, the site interval algebra and the marginal views derived from them."]

mod ancestry;
mod cf_events;
mod conversion;
mod frame;
mod graph;
mod hash;
mod ids;
mod locus;
mod marginal;
mod newick;
mod regions;
mod serialization;
mod site_walk;
mod topology;

pub use ancestry::{AncestryInterval, Coalescence, CoalescenceInterval, Lineages, SiteAncestry};
pub use cf_events::{CfEvent, CfEventKind, CfEventList};
pub use conversion::Conversion;
pub use frame::{ClonalFrame, Node};
pub use graph::{ConversionGraph, ConversionModel};
pub use hash::canonical_hash;
pub use ids::{ConversionId, NodeId};
pub use locus::Locus;
pub use marginal::{MarginalNode, MarginalTree};
pub use newick::{parse_newick, to_newick};
pub use regions::{region_list, Region};
pub use site_walk::{ancestral_site_walk, AncestralSiteWalk};
pub use topology::reattach;

/// Re-export serialization helpers for downstream crates.
pub use serialization::{
    graph_from_bytes, graph_from_json, graph_to_bytes, graph_to_json, ConversionRecord,
    GraphRecord, NodeRecord,
};
