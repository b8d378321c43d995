use acg_core::rng::RngHandle;
use acg_graph::{
    canonical_hash, parse_newick, Conversion, ConversionGraph, ConversionModel, Locus, NodeId,
};
use acg_mcmc::operators::{merge_proposal, split_proposal};

fn single_conversion(model: ConversionModel) -> ConversionGraph {
    let frame = parse_newick("((A:1,B:1):1,C:2);").unwrap();
    let mut acg =
        ConversionGraph::new(frame, vec![Locus::new("locus", 200).unwrap()], model).unwrap();
    acg.add_conversion(Conversion::new(
        0,
        20,
        80,
        NodeId::from_raw(0),
        0.3,
        NodeId::from_raw(3),
        1.5,
    ))
    .unwrap();
    acg
}

#[test]
fn restricted_split_then_merge_restores_the_graph() {
    let original = single_conversion(ConversionModel::Restricted);
    let hash = canonical_hash(&original);
    let mut reversed = 0;
    for seed in 0..50 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let split = split_proposal(&mut acg, 10.0, &mut rng).unwrap();
        if split == f64::NEG_INFINITY {
            continue;
        }
        assert_eq!(acg.conversion_count(), 2);
        assert!(acg.is_valid());

        let merge = merge_proposal(&mut acg, 10.0, &mut rng).unwrap();
        assert_eq!(acg.conversion_count(), 1);
        assert_eq!(canonical_hash(&acg), hash);
        assert!((split + merge).abs() < 1e-12, "seed {seed}: {split} + {merge}");
        reversed += 1;
    }
    assert!(reversed > 10);
}

#[test]
fn unrestricted_split_then_merge_restores_the_graph() {
    let original = single_conversion(ConversionModel::Unrestricted);
    let hash = canonical_hash(&original);
    let mut reversed = 0;
    for seed in 0..200 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let split = split_proposal(&mut acg, 10.0, &mut rng).unwrap();
        if split == f64::NEG_INFINITY {
            continue;
        }
        assert_eq!(acg.conversion_count(), 2);

        let merge = merge_proposal(&mut acg, 10.0, &mut rng).unwrap();
        if canonical_hash(&acg) != hash {
            continue;
        }
        assert!((split + merge).abs() < 1e-10, "seed {seed}: {split} + {merge}");
        reversed += 1;
    }
    assert!(reversed > 10);
}

#[test]
fn merge_needs_matching_edges() {
    let mut acg = single_conversion(ConversionModel::Restricted);
    acg.add_conversion(Conversion::new(
        0,
        90,
        120,
        NodeId::from_raw(1),
        0.3,
        NodeId::from_raw(3),
        1.5,
    ))
    .unwrap();
    let mut rng = RngHandle::from_seed(1);
    let log_hr = merge_proposal(&mut acg, 10.0, &mut rng).unwrap();
    assert_eq!(log_hr, f64::NEG_INFINITY);
    assert_eq!(acg.conversion_count(), 2);
}

#[test]
fn short_conversions_are_not_split() {
    let frame = parse_newick("(A:1,B:1);").unwrap();
    let mut acg = ConversionGraph::new(
        frame,
        vec![Locus::new("locus", 50).unwrap()],
        ConversionModel::Restricted,
    )
    .unwrap();
    acg.add_conversion(Conversion::new(
        0,
        4,
        5,
        NodeId::from_raw(0),
        0.3,
        NodeId::from_raw(1),
        0.6,
    ))
    .unwrap();
    let mut rng = RngHandle::from_seed(9);
    assert_eq!(
        split_proposal(&mut acg, 10.0, &mut rng).unwrap(),
        f64::NEG_INFINITY
    );
}
