use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{
    canonical_hash, parse_newick, Conversion, ConversionGraph, ConversionModel, Locus, NodeId,
};
use acg_mcmc::operators::{
    AcgScaler, AddRemoveRedundantConversion, ConvertedEdgeFlip, ConvertedEdgeHop,
    ConvertedEdgeSlide, Operator, ProposalContext, ReplaceConversion,
};
use acg_mcmc::ModelParams;

const LN_2: f64 = std::f64::consts::LN_2;

fn n(idx: usize) -> NodeId {
    NodeId::from_raw(idx)
}

// Leaves 0-2 at height 0, node 3 = (A,B) at 1, root 4 at 2.
fn graph(model: ConversionModel, conversions: &[Conversion]) -> ConversionGraph {
    let frame = parse_newick("((A:1,B:1):1,C:2);").unwrap();
    let mut acg =
        ConversionGraph::new(frame, vec![Locus::new("locus", 200).unwrap()], model).unwrap();
    for conv in conversions {
        acg.add_conversion(conv.clone()).unwrap();
    }
    acg
}

fn propose(
    operator: &mut dyn Operator,
    acg: &mut ConversionGraph,
    rng: &mut RngHandle,
) -> f64 {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(0.05, 10.0).unwrap();
    let ctx = ProposalContext::new(&population, params);
    operator.proposal(acg, &ctx, rng).unwrap()
}

fn endpoints(acg: &ConversionGraph) -> Vec<(NodeId, f64, NodeId, f64)> {
    acg.all_conversions()
        .map(|c| (c.node1, c.height1, c.node2, c.height2))
        .collect()
}

#[test]
fn slide_moves_one_endpoint_and_keeps_the_region() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 20, 80, n(0), 0.95, n(3), 1.05)],
    );
    let mut moved = 0;
    let mut crossed = 0;
    for seed in 0..400 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut ConvertedEdgeSlide::new(0.2), &mut acg, &mut rng);
        if log_hr == f64::NEG_INFINITY {
            continue;
        }
        assert!(acg.is_valid());
        let conv = acg.all_conversions().next().unwrap();
        assert_eq!((conv.start(), conv.end()), (20, 80));
        let departure_moved = conv.height1 != 0.95;
        let arrival_moved = conv.height2 != 1.05;
        assert!(departure_moved ^ arrival_moved, "seed {seed}");
        let steps = log_hr / LN_2;
        assert!((steps - steps.round()).abs() < 1e-12, "seed {seed}: {log_hr}");
        if conv.node1 != n(0) || conv.node2 != n(3) {
            crossed += 1;
        }
        moved += 1;
    }
    assert!(moved > 100);
    assert!(crossed > 10);
}

#[test]
fn slide_never_puts_a_departure_on_the_root() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 0, 10, n(2), 1.99, n(4), 3.0)],
    );
    for seed in 0..300 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut ConvertedEdgeSlide::new(0.5), &mut acg, &mut rng);
        if log_hr.is_finite() {
            let conv = acg.all_conversions().next().unwrap();
            assert_ne!(conv.node1, n(4));
            assert!(conv.height1 <= 2.0);
        }
    }
}

#[test]
fn hop_changes_a_lineage_but_no_height() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 5, 50, n(0), 0.5, n(1), 0.7)],
    );
    let before = endpoints(&original);
    for seed in 0..100 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut ConvertedEdgeHop::new(), &mut acg, &mut rng);
        assert_eq!(log_hr, 0.0);
        let (node1, height1, node2, height2) = endpoints(&acg)[0];
        assert_eq!((height1, height2), (before[0].1, before[0].3));
        let changed = usize::from(node1 != n(0)) + usize::from(node2 != n(1));
        assert_eq!(changed, 1, "seed {seed}");
        assert!(acg.is_valid());
    }
}

#[test]
fn hop_moves_the_departure_of_root_arrivals() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 5, 50, n(0), 0.5, n(4), 2.5)],
    );
    for seed in 0..50 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        assert_eq!(propose(&mut ConvertedEdgeHop::new(), &mut acg, &mut rng), 0.0);
        let (node1, _, node2, _) = endpoints(&acg)[0];
        assert_eq!(node2, n(4));
        assert!(node1 == n(1) || node1 == n(2), "seed {seed}: {node1:?}");
    }
}

#[test]
fn flip_twice_restores_the_graph() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 5, 50, n(0), 0.5, n(1), 0.7)],
    );
    let mut acg = original.clone();
    let mut rng = RngHandle::from_seed(3);
    assert_eq!(propose(&mut ConvertedEdgeFlip::new(), &mut acg, &mut rng), 0.0);
    assert_eq!(endpoints(&acg), vec![(n(1), 0.5, n(0), 0.7)]);
    assert_eq!(propose(&mut ConvertedEdgeFlip::new(), &mut acg, &mut rng), 0.0);
    assert_eq!(canonical_hash(&acg), canonical_hash(&original));
}

#[test]
fn flip_rejects_heights_off_the_other_edge() {
    let mut rng = RngHandle::from_seed(1);
    let mut root_arrival = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 5, 50, n(0), 0.5, n(4), 2.5)],
    );
    let log_hr = propose(&mut ConvertedEdgeFlip::new(), &mut root_arrival, &mut rng);
    assert_eq!(log_hr, f64::NEG_INFINITY);

    let mut above_leaf = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 5, 50, n(0), 0.5, n(2), 1.5)],
    );
    let log_hr = propose(&mut ConvertedEdgeFlip::new(), &mut above_leaf, &mut rng);
    assert_eq!(log_hr, f64::NEG_INFINITY);
}

#[test]
fn replace_split_then_fuse_is_reversible() {
    for model in [ConversionModel::Restricted, ConversionModel::Unrestricted] {
        let original = graph(model, &[Conversion::new(0, 20, 80, n(0), 0.3, n(3), 1.5)]);
        let hash = canonical_hash(&original);
        let mut reversed = 0;
        for seed in 0..400 {
            let mut acg = original.clone();
            let mut rng = RngHandle::from_seed(seed);
            let split = propose(&mut ReplaceConversion::new(5.0), &mut acg, &mut rng);
            if split == f64::NEG_INFINITY || acg.conversion_count() != 2 {
                continue;
            }
            assert!(acg.is_valid());
            let sites: usize = acg.all_conversions().map(Conversion::site_count).sum();
            assert!(sites < 61);

            let fuse = propose(&mut ReplaceConversion::new(5.0), &mut acg, &mut rng);
            if fuse == f64::NEG_INFINITY || canonical_hash(&acg) != hash {
                continue;
            }
            assert!((split + fuse).abs() < 1e-10, "{model:?} seed {seed}: {split} + {fuse}");
            reversed += 1;
        }
        assert!(reversed > 10, "{model:?}: {reversed}");
    }
}

#[test]
fn replace_rejects_in_whole_locus_mode() {
    let mut acg = graph(
        ConversionModel::Unrestricted,
        &[Conversion::new(0, 0, 199, n(0), 0.3, n(3), 1.5)],
    )
    .with_whole_locus_mode(true);
    for seed in 0..20 {
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut ReplaceConversion::default(), &mut acg, &mut rng);
        assert_eq!(log_hr, f64::NEG_INFINITY);
    }
}

#[test]
fn redundant_conversions_hug_a_coalescence() {
    let empty = graph(ConversionModel::Unrestricted, &[]);
    let mut added = 0;
    for seed in 0..200 {
        let mut acg = empty.clone();
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut AddRemoveRedundantConversion::new(0.1), &mut acg, &mut rng);
        if log_hr == f64::NEG_INFINITY {
            continue;
        }
        assert!(log_hr.is_finite());
        let conv = acg.all_conversions().next().unwrap();
        let parent = acg.frame().parent(conv.node1).unwrap();
        let joins = [parent, acg.frame().parent(parent).unwrap_or(parent)];
        assert!(
            joins.iter().any(|&node| {
                let h = acg.frame().height(node);
                (conv.height1 - h).abs() < 0.2 || (conv.height2 - h).abs() < 0.2
            }),
            "seed {seed}"
        );
        added += 1;
    }
    assert!(added > 20);
}

#[test]
fn redundant_removal_undoes_an_addition() {
    let empty = graph(ConversionModel::Restricted, &[]);
    // The wider window lets neighbourhoods of adjacent coalescences overlap.
    for window in [0.1, 0.6] {
        let mut reversed = 0;
        for seed in 0..400 {
            let mut acg = empty.clone();
            let mut rng = RngHandle::from_seed(seed);
            let mut operator = AddRemoveRedundantConversion::new(window);
            let add = propose(&mut operator, &mut acg, &mut rng);
            if add == f64::NEG_INFINITY {
                continue;
            }
            assert!(acg.is_valid());
            let remove = propose(&mut operator, &mut acg, &mut rng);
            if remove == f64::NEG_INFINITY || acg.conversion_count() != 0 {
                continue;
            }
            reversed += 1;
            assert!((add + remove).abs() < 1e-9, "window {window} seed {seed}");
        }
        assert!(reversed > 5, "window {window}");
    }
}

#[test]
fn scaler_ratio_counts_the_scaled_heights() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[
            Conversion::new(0, 5, 50, n(0), 0.5, n(1), 0.7),
            Conversion::new(0, 60, 90, n(3), 1.5, n(4), 2.5),
        ],
    );
    let mut accepted = 0;
    for seed in 0..100 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let log_hr = propose(&mut AcgScaler::new(0.8), &mut acg, &mut rng);
        if log_hr == f64::NEG_INFINITY {
            continue;
        }
        let f = acg.frame().height(n(4)) / 2.0;
        assert!((acg.frame().height(n(3)) - f).abs() < 1e-12);
        assert_eq!(acg.frame().height(n(0)), 0.0);
        // two internal nodes and four endpoints
        assert!((log_hr - 4.0 * f.ln()).abs() < 1e-12, "seed {seed}");
        accepted += 1;
    }
    assert!(accepted > 50);
}

#[test]
fn root_only_scaler_leaves_lower_edges_alone() {
    let original = graph(
        ConversionModel::Unrestricted,
        &[
            Conversion::new(0, 5, 50, n(0), 0.5, n(1), 0.7),
            Conversion::new(0, 60, 90, n(3), 1.5, n(4), 2.5),
        ],
    );
    let mut accepted = 0;
    for seed in 0..100 {
        let mut acg = original.clone();
        let mut rng = RngHandle::from_seed(seed);
        let mut operator = AcgScaler::new(0.8).with_root_only(true);
        let log_hr = propose(&mut operator, &mut acg, &mut rng);
        if log_hr == f64::NEG_INFINITY {
            continue;
        }
        let f = acg.frame().height(n(4)) / 2.0;
        assert_eq!(acg.frame().height(n(3)), 1.0);
        assert_eq!(endpoints(&acg)[0], (n(0), 0.5, n(1), 0.7));
        let (_, height1, _, height2) = endpoints(&acg)[1];
        assert!((height1 - 1.5 * f).abs() < 1e-12 && (height2 - 2.5 * f).abs() < 1e-12);
        assert!((log_hr - f.ln()).abs() < 1e-12, "seed {seed}");
        accepted += 1;
    }
    assert!(accepted > 20);
}
