//! Chains started from exact prior draws must stay at the prior. Each test
//! simulates independent graphs, runs a short prior-only chain from each with
//! a given operator mix and compares the end states against closed-form
//! moments of the coalescent, and against the starting states for moments
//! with no closed form.

use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, ConversionModel, Locus};
use acg_mcmc::determinism::replicate_seed;
use acg_mcmc::{
    expected_conversion_count, run, simulate_acg, ModelParams, OperatorWeights,
    PopulationConfig, RegionProcess, RunConfig,
};

const LEAVES: [f64; 4] = [0.0; 4];
// Four contemporaneous leaves under a unit population.
const ROOT_MEAN: f64 = 1.5;
const LENGTH_MEAN: f64 = 11.0 / 3.0;
const REPLICATES: usize = 10_000;
const STEPS: usize = 20;
const Z_LIMIT: f64 = 4.5;

#[derive(Debug, Clone, Copy)]
struct Moments {
    root: f64,
    length: f64,
    /// Conversion count minus its conditional mean given the frame.
    excess: f64,
    count: f64,
    span: f64,
    arrival: f64,
    same_edge: f64,
}

fn rho(model: ConversionModel) -> f64 {
    match model {
        ConversionModel::Unrestricted => 0.05,
        ConversionModel::Restricted => 2.0,
    }
}

fn conditional_count(acg: &ConversionGraph, params: &ModelParams) -> f64 {
    match acg.model() {
        ConversionModel::Unrestricted => expected_conversion_count(acg, params),
        ConversionModel::Restricted => acg
            .loci()
            .iter()
            .map(|locus| {
                let sites = locus.site_count();
                let process = RegionProcess::for_locus(acg, params, sites);
                let (alpha, delta) = (process.alpha, params.delta);
                alpha * (delta + sites as f64 - 1.0) / (alpha * delta + 1.0)
            })
            .sum(),
    }
}

fn moments(acg: &ConversionGraph, params: &ModelParams) -> Moments {
    let frame = acg.frame();
    let count = acg.conversion_count() as f64;
    Moments {
        root: frame.height(frame.root()),
        length: acg.clonal_frame_length(),
        excess: count - conditional_count(acg, params),
        count,
        span: acg.all_conversions().map(|c| c.height2 - c.height1).sum(),
        arrival: acg.all_conversions().map(|c| c.height2).sum(),
        same_edge: acg.all_conversions().filter(|c| c.node1 == c.node2).count() as f64,
    }
}

fn weights(enabled: &[&str]) -> OperatorWeights {
    let mut weights = OperatorWeights {
        add_remove: 0.0,
        cf_uniform: 0.0,
        cf_wilson_balding: 0.0,
        merge_split: 0.0,
        cf_swap: 0.0,
        region_shift: 0.0,
        boundary_shift: 0.0,
        pair_boundary_shift: 0.0,
        detour: 0.0,
        edge_slide: 0.0,
        edge_hop: 0.0,
        edge_flip: 0.0,
        replace: 0.0,
        redundant: 0.0,
        scaler: 0.0,
    };
    for name in enabled {
        let slot = match *name {
            "add-remove-conversion" => &mut weights.add_remove,
            "cf-uniform" => &mut weights.cf_uniform,
            "cf-wilson-balding" => &mut weights.cf_wilson_balding,
            "merge-split-conversion" => &mut weights.merge_split,
            "cf-conversion-swap" => &mut weights.cf_swap,
            "converted-region-shift" => &mut weights.region_shift,
            "converted-region-boundary-shift" => &mut weights.boundary_shift,
            "pair-boundary-shift" => &mut weights.pair_boundary_shift,
            "add-remove-detour" => &mut weights.detour,
            "converted-edge-slide" => &mut weights.edge_slide,
            "converted-edge-hop" => &mut weights.edge_hop,
            "converted-edge-flip" => &mut weights.edge_flip,
            "replace-conversion" => &mut weights.replace,
            "add-remove-redundant-conversion" => &mut weights.redundant,
            "acg-scaler" => &mut weights.scaler,
            other => panic!("unknown operator {other}"),
        };
        *slot = 1.0;
    }
    weights
}

/// Start and end moments of `REPLICATES` short chains.
fn chains(model: ConversionModel, operators: &[&str], seed: u64) -> Vec<(Moments, Moments)> {
    let params = ModelParams::new(rho(model), 10.0).unwrap();
    let population = ConstantPopulation::new(1.0).unwrap();
    let mut config = RunConfig::default();
    config.steps = STEPS;
    config.model.rho = params.rho;
    config.model.delta = params.delta;
    config.model.conversion_model = model;
    config.population = PopulationConfig::Constant { size: 1.0 };
    config.operators.weights = weights(operators);

    (0..REPLICATES)
        .map(|rep| {
            let mut rng = RngHandle::from_seed(replicate_seed(seed, rep));
            let loci = vec![Locus::new("locus", 100).unwrap()];
            let start = simulate_acg(&params, &population, &LEAVES, loci, model, &mut rng).unwrap();
            config.seed_policy.master_seed = replicate_seed(seed ^ 0xFF, rep);
            let summary = run(&config, &start).unwrap();
            let end = summary.final_graph.into_graph().unwrap();
            (moments(&start, &params), moments(&end, &params))
        })
        .collect()
}

fn assert_centred(label: &str, values: impl Iterator<Item = f64>, target: f64) {
    let values: Vec<f64> = values.collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let se = (var / n).sqrt();
    if se == 0.0 {
        assert!((mean - target).abs() < 1e-12, "{label}: {mean} vs {target}");
        return;
    }
    let z = (mean - target) / se;
    assert!(z.abs() < Z_LIMIT, "{label}: mean {mean} vs {target} (z = {z:.2})");
}

fn assert_stationary(model: ConversionModel, operators: &[&str], seed: u64) {
    let pairs = chains(model, operators, seed);
    let tag = format!("{model:?} {operators:?}");
    assert_centred(&format!("{tag} root"), pairs.iter().map(|(_, e)| e.root), ROOT_MEAN);
    assert_centred(&format!("{tag} length"), pairs.iter().map(|(_, e)| e.length), LENGTH_MEAN);
    assert_centred(&format!("{tag} excess"), pairs.iter().map(|(_, e)| e.excess), 0.0);
    let paired: [(&str, fn(&Moments) -> f64); 4] = [
        ("count", |m| m.count),
        ("span", |m| m.span),
        ("arrival", |m| m.arrival),
        ("same-edge", |m| m.same_edge),
    ];
    for (name, stat) in paired {
        assert_centred(
            &format!("{tag} {name}"),
            pairs.iter().map(|(s, e)| stat(e) - stat(s)),
            0.0,
        );
    }
}

#[test]
fn simulated_starts_match_the_closed_forms() {
    for model in [ConversionModel::Unrestricted, ConversionModel::Restricted] {
        let pairs = chains(model, &["cf-uniform"], 1);
        let tag = format!("{model:?} start");
        assert_centred(&format!("{tag} root"), pairs.iter().map(|(s, _)| s.root), ROOT_MEAN);
        assert_centred(&format!("{tag} length"), pairs.iter().map(|(s, _)| s.length), LENGTH_MEAN);
        assert_centred(&format!("{tag} excess"), pairs.iter().map(|(s, _)| s.excess), 0.0);
        let mean_count = pairs.iter().map(|(s, _)| s.count).sum::<f64>() / pairs.len() as f64;
        assert!(mean_count > 1.0, "{tag}: {mean_count}");
    }
}

#[test]
fn frame_moves_keep_the_prior() {
    assert_stationary(
        ConversionModel::Unrestricted,
        &["add-remove-conversion", "cf-uniform", "cf-wilson-balding"],
        2,
    );
}

#[test]
fn wilson_balding_alone_keeps_the_conversion_count() {
    assert_stationary(ConversionModel::Unrestricted, &["cf-wilson-balding"], 3);
}

#[test]
fn region_and_topology_moves_keep_the_prior() {
    assert_stationary(
        ConversionModel::Unrestricted,
        &[
            "add-remove-conversion",
            "merge-split-conversion",
            "cf-conversion-swap",
            "add-remove-detour",
            "converted-region-shift",
            "converted-region-boundary-shift",
        ],
        4,
    );
}

#[test]
fn edge_slide_keeps_the_prior() {
    assert_stationary(ConversionModel::Unrestricted, &["converted-edge-slide"], 5);
}

#[test]
fn edge_hop_keeps_the_prior() {
    assert_stationary(ConversionModel::Unrestricted, &["converted-edge-hop"], 6);
}

#[test]
fn edge_flip_keeps_the_prior() {
    assert_stationary(ConversionModel::Unrestricted, &["converted-edge-flip"], 7);
}

#[test]
fn replace_keeps_the_prior() {
    assert_stationary(ConversionModel::Unrestricted, &["replace-conversion"], 8);
}

#[test]
fn redundant_conversions_keep_the_prior() {
    assert_stationary(
        ConversionModel::Unrestricted,
        &["add-remove-redundant-conversion"],
        9,
    );
}

#[test]
fn scaler_keeps_the_prior() {
    assert_stationary(ConversionModel::Unrestricted, &["acg-scaler"], 10);
}

#[test]
fn restricted_frame_moves_keep_the_prior() {
    assert_stationary(
        ConversionModel::Restricted,
        &["add-remove-conversion", "cf-uniform", "cf-wilson-balding"],
        11,
    );
}

#[test]
fn restricted_region_moves_keep_the_prior() {
    assert_stationary(
        ConversionModel::Restricted,
        &[
            "merge-split-conversion",
            "cf-conversion-swap",
            "converted-region-shift",
            "converted-region-boundary-shift",
            "pair-boundary-shift",
            "replace-conversion",
        ],
        12,
    );
}

#[test]
fn restricted_edge_moves_keep_the_prior() {
    assert_stationary(
        ConversionModel::Restricted,
        &[
            "converted-edge-slide",
            "converted-edge-hop",
            "converted-edge-flip",
            "add-remove-redundant-conversion",
            "acg-scaler",
        ],
        13,
    );
}
