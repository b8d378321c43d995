use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionModel, Locus};
use acg_mcmc::determinism::replicate_seed;
use acg_mcmc::{simulate_acg, simulate_clonal_frame, ModelParams};

const REPLICATES: usize = 20_000;

#[test]
fn two_taxon_unrestricted_moments() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(0.01, 10.0).unwrap();
    let mut root_heights = 0.0;
    let mut frame_lengths = 0.0;
    let mut counts = 0usize;
    let mut departures = 0.0;
    for replicate in 0..REPLICATES {
        let mut rng = RngHandle::from_seed(replicate_seed(42, replicate));
        let acg = simulate_acg(
            &params,
            &population,
            &[0.0, 0.0],
            vec![Locus::new("locus", 100).unwrap()],
            ConversionModel::Unrestricted,
            &mut rng,
        )
        .unwrap();
        root_heights += acg.frame().height(acg.root());
        frame_lengths += acg.clonal_frame_length();
        counts += acg.conversion_count();
        for conv in acg.all_conversions() {
            assert!(conv.height1 <= conv.height2);
            departures += conv.height1;
        }
    }
    let n = REPLICATES as f64;
    let mean_height = root_heights / n;
    let mean_length = frame_lengths / n;
    let mean_count = counts as f64 / n;
    let mean_departure = departures / counts as f64;

    assert!((mean_height - 1.0).abs() < 0.04, "height {mean_height}");
    assert!((mean_length - 2.0).abs() < 0.08, "length {mean_length}");
    // rho * E[L_cf] * (L + delta - 1)
    assert!((mean_count - 2.18).abs() < 0.1, "count {mean_count}");
    assert!((mean_departure - 1.0).abs() < 0.05, "departure {mean_departure}");
}

#[test]
fn serially_sampled_frame_starts_at_the_latest_leaf() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let mut total = 0.0;
    for replicate in 0..REPLICATES {
        let mut rng = RngHandle::from_seed(replicate_seed(7, replicate));
        let frame = simulate_clonal_frame(&population, &[0.0, 0.5], &mut rng).unwrap();
        let root = frame.height(frame.root());
        assert!(root > 0.5);
        total += root;
    }
    let mean = total / REPLICATES as f64;
    assert!((mean - 1.5).abs() < 0.04, "root height {mean}");
}

#[test]
fn restricted_simulation_keeps_conversions_apart() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(2.0, 15.0).unwrap();
    let mut converted = 0usize;
    for replicate in 0..200 {
        let mut rng = RngHandle::from_seed(replicate_seed(3, replicate));
        let acg = simulate_acg(
            &params,
            &population,
            &[0.0, 0.0, 0.0, 0.0],
            vec![
                Locus::new("a", 400).unwrap(),
                Locus::new("b", 150).unwrap(),
            ],
            ConversionModel::Restricted,
            &mut rng,
        )
        .unwrap();
        assert!(acg.is_valid(), "replicate {replicate}");
        for locus in 0..acg.loci().len() {
            for pair in acg.conversions(locus).windows(2) {
                assert!(pair[0].end() + 1 < pair[1].start());
            }
        }
        converted += acg.conversion_count();
    }
    assert!(converted > 0);
}

#[test]
fn too_few_leaves_is_an_error() {
    let population = ConstantPopulation::new(1.0).unwrap();
    let mut rng = RngHandle::from_seed(0);
    let err = simulate_clonal_frame(&population, &[0.0], &mut rng).unwrap_err();
    assert_eq!(err.code(), "too-few-leaves");
}
