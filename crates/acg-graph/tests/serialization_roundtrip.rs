use acg_graph::{
    canonical_hash, graph_from_bytes, graph_from_json, graph_to_bytes, graph_to_json, parse_newick,
    to_newick, Conversion, ConversionGraph, ConversionModel, GraphRecord, Locus, NodeId,
};

fn sample_graph() -> ConversionGraph {
    let frame = parse_newick("((A:1,B:1):1,C:2);").unwrap();
    let loci = vec![Locus::new("gene1", 40).unwrap(), Locus::new("gene2", 60).unwrap()];
    let mut acg = ConversionGraph::new(frame, loci, ConversionModel::Restricted).unwrap();
    let n = NodeId::from_raw;
    acg.add_conversion(Conversion::new(0, 3, 9, n(0), 0.25, n(2), 1.75)).unwrap();
    acg.add_conversion(Conversion::new(0, 20, 39, n(3), 1.5, n(4), 2.5)).unwrap();
    acg.add_conversion(Conversion::new(1, 0, 0, n(1), 0.5, n(0), 0.75)).unwrap();
    acg
}

#[test]
fn json_roundtrip_preserves_structure() {
    let acg = sample_graph();
    let json = graph_to_json(&acg).unwrap();
    let restored = graph_from_json(&json).unwrap();
    assert_eq!(GraphRecord::from_graph(&restored), GraphRecord::from_graph(&acg));
    assert_eq!(canonical_hash(&restored), canonical_hash(&acg));
}

#[test]
fn bincode_roundtrip_preserves_structure() {
    let acg = sample_graph();
    let bytes = graph_to_bytes(&acg).unwrap();
    let restored = graph_from_bytes(&bytes).unwrap();
    assert_eq!(GraphRecord::from_graph(&restored), GraphRecord::from_graph(&acg));
}

#[test]
fn hash_tracks_conversion_changes() {
    let acg = sample_graph();
    let mut moved = acg.clone();
    let id = moved.conversions(0)[0].id();
    moved.set_conversion_region(id, 4, 9).unwrap();
    assert_ne!(canonical_hash(&acg), canonical_hash(&moved));
    assert_eq!(canonical_hash(&acg), canonical_hash(&acg.clone()));
}

#[test]
fn invalid_records_are_rejected() {
    let mut record = GraphRecord::from_graph(&sample_graph());
    record.conversions[0].end_site = 21;
    assert_eq!(record.clone().into_graph().unwrap_err().code(), "region-unavailable");

    let mut record = GraphRecord::from_graph(&sample_graph());
    record.conversions[0].node1 = 99;
    assert!(record.into_graph().is_err());

    assert_eq!(graph_from_json("{").unwrap_err().code(), "deserialize-json");
}

#[test]
fn newick_roundtrip() {
    let frame = parse_newick("((A:1,B:1.5):1,'C d':1.5);").unwrap();
    assert_eq!(frame.leaf_count(), 3);
    assert_eq!(frame.label(NodeId::from_raw(2)), Some("C d"));
    let text = to_newick(&frame);
    assert_eq!(text, "((A:1,B:1.5):1,'C d':1.5);");
    assert_eq!(parse_newick(&text).unwrap(), frame);
}

#[test]
fn newick_errors_are_reported() {
    assert_eq!(parse_newick("((A:1,B:1);").unwrap_err().code(), "newick-syntax");
    assert_eq!(parse_newick("(A:1,B:1)").unwrap_err().code(), "newick-syntax");
    assert_eq!(parse_newick("(A:1,B:1,C:1);").unwrap_err().code(), "non-binary");
    assert_eq!(parse_newick("(A:-1,B:1);").unwrap_err().code(), "newick-syntax");
}
