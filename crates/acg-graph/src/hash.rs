use sha2::{Digest, Sha256};

use crate::graph::{ConversionGraph, ConversionModel};
use crate::serialization::GraphRecord;

/// Computes the canonical structural hash of a graph.
///
/// Conversion ids are not part of the hash, so two graphs that differ only
/// in insertion history hash identically.
pub fn canonical_hash(acg: &ConversionGraph) -> String {
    let record = GraphRecord::from_graph(acg);
    let mut hasher = Sha256::new();
    match record.model {
        ConversionModel::Unrestricted => hasher.update(b"model:unrestricted"),
        ConversionModel::Restricted => hasher.update(b"model:restricted"),
    }
    hasher.update([u8::from(record.whole_locus_mode)]);

    hasher.update((record.loci.len() as u64).to_le_bytes());
    for locus in &record.loci {
        update_str(locus.name(), &mut hasher);
        hasher.update((locus.site_count() as u64).to_le_bytes());
    }

    hasher.update((record.nodes.len() as u64).to_le_bytes());
    for node in &record.nodes {
        hasher.update(node.height.to_bits().to_le_bytes());
        encode_option_usize(node.parent, &mut hasher);
        match &node.label {
            Some(label) => update_str(label, &mut hasher),
            None => hasher.update(b"unlabelled"),
        }
    }

    let mut conversions = record.conversions;
    conversions.sort_by(|a, b| {
        (a.locus, a.start_site, a.end_site, a.node1, a.node2)
            .cmp(&(b.locus, b.start_site, b.end_site, b.node1, b.node2))
            .then(a.height1.total_cmp(&b.height1))
            .then(a.height2.total_cmp(&b.height2))
    });
    hasher.update((conversions.len() as u64).to_le_bytes());
    for conv in &conversions {
        for value in [conv.locus, conv.start_site, conv.end_site, conv.node1, conv.node2] {
            hasher.update((value as u64).to_le_bytes());
        }
        hasher.update(conv.height1.to_bits().to_le_bytes());
        hasher.update(conv.height2.to_bits().to_le_bytes());
    }

    format!("{:x}", hasher.finalize())
}

fn update_str(value: &str, hasher: &mut Sha256) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn encode_option_usize(value: Option<usize>, hasher: &mut Sha256) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update((v as u64).to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}
