use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

use crate::conversion::Conversion;
use crate::frame::ClonalFrame;
use crate::graph::{ConversionGraph, ConversionModel};
use crate::ids::NodeId;
use crate::locus::Locus;

/// Flat record of a clonal frame node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node height.
    pub height: f64,
    /// Parent index.
    pub parent: Option<usize>,
    /// Optional taxon label.
    #[serde(default)]
    pub label: Option<String>,
}

/// Flat record of a conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Departure node index.
    pub node1: usize,
    /// Departure height.
    pub height1: f64,
    /// Arrival node index.
    pub node2: usize,
    /// Arrival height.
    pub height2: f64,
    /// First converted site.
    pub start_site: usize,
    /// Last converted site.
    pub end_site: usize,
    /// Locus index.
    pub locus: usize,
}

/// Persistable form of a [`ConversionGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Conversion model.
    pub model: ConversionModel,
    /// Whether conversions span whole loci.
    #[serde(default)]
    pub whole_locus_mode: bool,
    /// Loci in declaration order.
    pub loci: Vec<Locus>,
    /// Clonal frame nodes by index.
    pub nodes: Vec<NodeRecord>,
    /// Conversions, locus by locus in start order.
    pub conversions: Vec<ConversionRecord>,
}

impl GraphRecord {
    /// Captures the graph.
    pub fn from_graph(acg: &ConversionGraph) -> Self {
        let frame = acg.frame();
        let nodes = frame
            .node_ids()
            .map(|id| NodeRecord {
                height: frame.height(id),
                parent: frame.parent(id).map(NodeId::index),
                label: frame.label(id).map(str::to_owned),
            })
            .collect();
        let conversions = acg
            .all_conversions()
            .map(|c| ConversionRecord {
                node1: c.node1.index(),
                height1: c.height1,
                node2: c.node2.index(),
                height2: c.height2,
                start_site: c.start(),
                end_site: c.end(),
                locus: c.locus(),
            })
            .collect();
        Self {
            model: acg.model(),
            whole_locus_mode: acg.whole_locus_mode(),
            loci: acg.loci().to_vec(),
            nodes,
            conversions,
        }
    }

    /// Rebuilds and validates the graph.
    pub fn into_graph(self) -> Result<ConversionGraph, AcgError> {
        let frame = ClonalFrame::from_records(
            self.nodes
                .into_iter()
                .map(|n| (n.height, n.parent, n.label)),
        )?;
        let mut acg = ConversionGraph::new(frame, self.loci, self.model)?
            .with_whole_locus_mode(self.whole_locus_mode);
        for record in self.conversions {
            if record.node1 >= acg.frame().node_count() || record.node2 >= acg.frame().node_count() {
                return Err(AcgError::Serde(
                    ErrorInfo::new("dangling-endpoint", "conversion endpoint out of range")
                        .with_context("node1", record.node1)
                        .with_context("node2", record.node2),
                ));
            }
            acg.add_conversion(Conversion::new(
                record.locus,
                record.start_site,
                record.end_site,
                NodeId::from_raw(record.node1),
                record.height1,
                NodeId::from_raw(record.node2),
                record.height2,
            ))?;
        }
        acg.validate()?;
        Ok(acg)
    }
}

/// Serializes the graph to a compact binary representation using `bincode`.
pub fn graph_to_bytes(acg: &ConversionGraph) -> Result<Vec<u8>, AcgError> {
    bincode::serialize(&GraphRecord::from_graph(acg))
        .map_err(|err| AcgError::Serde(ErrorInfo::new("serialize-bytes", err.to_string())))
}

/// Restores a graph from its binary representation.
pub fn graph_from_bytes(bytes: &[u8]) -> Result<ConversionGraph, AcgError> {
    let record: GraphRecord = bincode::deserialize(bytes)
        .map_err(|err| AcgError::Serde(ErrorInfo::new("deserialize-bytes", err.to_string())))?;
    record.into_graph()
}

/// Serializes the graph to a JSON string.
pub fn graph_to_json(acg: &ConversionGraph) -> Result<String, AcgError> {
    serde_json::to_string_pretty(&GraphRecord::from_graph(acg))
        .map_err(|err| AcgError::Serde(ErrorInfo::new("serialize-json", err.to_string())))
}

/// Restores a graph from a JSON string.
pub fn graph_from_json(json: &str) -> Result<ConversionGraph, AcgError> {
    let record: GraphRecord = serde_json::from_str(json)
        .map_err(|err| AcgError::Serde(ErrorInfo::new("deserialize-json", err.to_string())))?;
    record.into_graph()
}
