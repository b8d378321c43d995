use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{
    canonical_hash, parse_newick, Conversion, ConversionGraph, ConversionModel, Locus, NodeId,
};
use acg_mcmc::operators::{ClonalFrameConversionSwap, Operator, ProposalContext};
use acg_mcmc::ModelParams;

fn frame_only(model: ConversionModel) -> ConversionGraph {
    let frame = parse_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap();
    ConversionGraph::new(frame, vec![Locus::new("locus", 200).unwrap()], model).unwrap()
}

#[test]
fn unrestricted_create_then_delete_restores_the_frame() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(0.01, 20.0).unwrap();
    let ctx = ProposalContext::new(&population, params);
    let original = frame_only(ConversionModel::Unrestricted);
    let hash = canonical_hash(&original);
    let mut op = ClonalFrameConversionSwap::new();

    let mut round_trips = 0;
    for seed in 0..60 {
        let mut created = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let create = op.proposal(&mut created, &ctx, &mut rng).unwrap();
        if create == f64::NEG_INFINITY || created.conversion_count() != 1 {
            continue;
        }
        assert!(created.is_valid());
        assert_ne!(canonical_hash(&created), hash);

        for inner in 0..40 {
            let mut deleted = created.clone();
            let mut rng = RngHandle::from_seed(1_000 + inner);
            let delete = op.proposal(&mut deleted, &ctx, &mut rng).unwrap();
            if delete == f64::NEG_INFINITY || deleted.conversion_count() != 0 {
                continue;
            }
            assert_eq!(canonical_hash(&deleted), hash, "seed {seed}/{inner}");
            assert!(
                (create + delete).abs() < 1e-10,
                "seed {seed}/{inner}: {create} + {delete}"
            );
            round_trips += 1;
            break;
        }
    }
    assert!(round_trips > 5, "only {round_trips} round trips");
}

#[test]
fn restricted_swap_exchanges_converted_and_unconverted_stretches() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(1.0, 20.0).unwrap();
    let ctx = ProposalContext::new(&population, params);
    let mut acg = frame_only(ConversionModel::Restricted);
    acg.add_conversion(Conversion::new(
        0,
        20,
        80,
        NodeId::from_raw(0),
        0.3,
        NodeId::from_raw(2),
        1.5,
    ))
    .unwrap();

    let mut rng = RngHandle::from_seed(4);
    let log_hr = ClonalFrameConversionSwap::new()
        .proposal(&mut acg, &ctx, &mut rng)
        .unwrap();
    assert!(log_hr.is_finite());
    assert!(acg.is_valid());

    let regions: Vec<(usize, usize)> = acg
        .conversions(0)
        .iter()
        .map(|c| (c.start(), c.end()))
        .collect();
    assert_eq!(regions, vec![(0, 19), (81, 199)]);

    let frame = acg.frame();
    let a = NodeId::from_raw(0);
    let c = NodeId::from_raw(2);
    assert_eq!(frame.sibling(a), Some(c));
    assert_eq!(frame.parent_height(a), Some(1.5));
}

#[test]
fn restricted_swap_needs_a_conversion() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(1.0, 20.0).unwrap();
    let ctx = ProposalContext::new(&population, params);
    let mut acg = frame_only(ConversionModel::Restricted);
    let mut rng = RngHandle::from_seed(0);
    let log_hr = ClonalFrameConversionSwap::new()
        .proposal(&mut acg, &ctx, &mut rng)
        .unwrap();
    assert_eq!(log_hr, f64::NEG_INFINITY);
}
