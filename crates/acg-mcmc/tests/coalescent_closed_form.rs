use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{parse_newick, Conversion, ConversionGraph, ConversionModel, Locus, NodeId};
use acg_mcmc::determinism::replicate_seed;
use acg_mcmc::sampling::{affected_region_prob, edge_coalescence_prob};
use acg_mcmc::{
    clonal_frame_log_p, converted_region_map_log_p, expected_conversion_count, recombinant_log_p,
    simulate_acg, AcgCoalescent, CoalescentModel, GcCoalescentApprox, ModelParams,
};

const L: usize = 100;

fn pair(model: ConversionModel) -> ConversionGraph {
    let frame = parse_newick("(A:1,B:1);").unwrap();
    ConversionGraph::new(frame, vec![Locus::new("locus", L).unwrap()], model).unwrap()
}

fn n(idx: usize) -> NodeId {
    NodeId::from_raw(idx)
}

fn assert_close(actual: f64, expected: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() / scale < 1e-12,
        "{actual} vs {expected}"
    );
}

#[test]
fn clonal_frame_density_of_two_lineages() {
    let acg = pair(ConversionModel::Unrestricted);
    let unit = ConstantPopulation::new(1.0).unwrap();
    assert_close(clonal_frame_log_p(&acg, &unit), -1.0);

    let doubled = ConstantPopulation::new(2.0).unwrap();
    assert_close(clonal_frame_log_p(&acg, &doubled), -0.5 - 2f64.ln());
}

#[test]
fn recombinant_density_spans_the_root() {
    let mut acg = pair(ConversionModel::Unrestricted);
    let pop = ConstantPopulation::new(1.0).unwrap();
    let below = acg
        .add_conversion(Conversion::new(0, 0, 4, n(0), 0.5, n(1), 0.8))
        .unwrap();
    let above = acg
        .add_conversion(Conversion::new(0, 0, 4, n(0), 0.5, n(2), 1.5))
        .unwrap();

    let below = acg.conversion(below).unwrap();
    assert_close(recombinant_log_p(&acg, &pop, below), -(2f64.ln()) - 0.6);
    let above = acg.conversion(above).unwrap();
    assert_close(recombinant_log_p(&acg, &pop, above), -(2f64.ln()) - 1.5);
}

#[test]
fn unrestricted_prior_with_zero_and_one_conversion() {
    let pop = ConstantPopulation::new(1.0).unwrap();
    let (rho, delta) = (0.01, 10.0);
    let params = ModelParams::new(rho, delta).unwrap();
    let model = AcgCoalescent::new(params);
    let alpha = L as f64 + delta - 1.0;
    let mu = rho * 2.0 * alpha;

    let mut acg = pair(ConversionModel::Unrestricted);
    assert_close(model.log_p(&acg, &pop), -1.0 - mu);

    acg.add_conversion(Conversion::new(0, 0, 4, n(0), 0.5, n(1), 0.8))
        .unwrap();
    let expected = -1.0 - mu + mu.ln() + (-(2f64.ln()) - 0.6) + (delta / alpha).ln()
        + 4.0 * (1.0 - 1.0 / delta).ln()
        - delta.ln();
    assert_close(model.log_p(&acg, &pop), expected);
}

#[test]
fn unrestricted_prior_splits_into_frame_count_and_conversion_terms() {
    let pop = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(0.05, 10.0).unwrap();
    let model = AcgCoalescent::new(params);
    for replicate in 0..50 {
        let mut rng = RngHandle::from_seed(replicate_seed(11, replicate));
        let acg = simulate_acg(
            &params,
            &pop,
            &[0.0, 0.0, 0.2, 0.5],
            vec![Locus::new("a", 60).unwrap(), Locus::new("b", 40).unwrap()],
            ConversionModel::Unrestricted,
            &mut rng,
        )
        .unwrap();
        let count = acg.conversion_count() as f64;
        let mean = expected_conversion_count(&acg, &params);
        let per_conversion: f64 = acg
            .all_conversions()
            .map(|c| {
                edge_coalescence_prob(&acg, &pop, c.height1, c.height2)
                    + affected_region_prob(&acg, params.delta, c)
            })
            .sum();
        let remainder = model.log_p(&acg, &pop)
            - clonal_frame_log_p(&acg, &pop)
            - (-mean + count * mean.ln());
        assert_close(
            remainder,
            per_conversion - count * acg.clonal_frame_length().ln(),
        );
    }
}

#[test]
fn count_bounds_truncate_the_poisson_prior() {
    let pop = ConstantPopulation::new(1.0).unwrap();
    let params = ModelParams::new(0.01, 10.0)
        .unwrap()
        .with_count_bounds(1, Some(3));
    let bounded = AcgCoalescent::new(params);
    let free = AcgCoalescent::new(ModelParams::new(0.01, 10.0).unwrap());

    let mut acg = pair(ConversionModel::Unrestricted);
    assert_eq!(bounded.log_p(&acg, &pop), f64::NEG_INFINITY);

    acg.add_conversion(Conversion::new(0, 3, 9, n(1), 0.2, n(0), 0.9))
        .unwrap();
    let mu: f64 = 0.01 * 2.0 * 109.0;
    let mass: f64 = (1..=3)
        .map(|k| {
            let factorial: f64 = (1..=k).map(f64::from).product();
            (-mu).exp() * mu.powi(k) / factorial
        })
        .sum();
    assert_close(bounded.log_p(&acg, &pop), free.log_p(&acg, &pop) - mass.ln());
}

#[test]
fn restricted_prior_with_zero_and_one_conversion() {
    let pop = ConstantPopulation::new(1.0).unwrap();
    let (rho, delta) = (0.5, 8.0);
    let params = ModelParams::new(rho, delta).unwrap();
    let model = GcCoalescentApprox::new(params);
    let alpha = 0.5 * rho * 2.0 / L as f64;
    let p_start_cf = 1.0 / (alpha * delta + 1.0);
    let stay = (1.0 - alpha).ln();

    let mut acg = pair(ConversionModel::Restricted);
    let empty_map = p_start_cf.ln() + (L - 1) as f64 * stay;
    assert_close(converted_region_map_log_p(&acg, &params, 0), empty_map);
    assert_close(model.log_p(&acg, &pop), -1.0 + empty_map);

    acg.add_conversion(Conversion::new(0, 10, 14, n(0), 0.5, n(1), 0.8))
        .unwrap();
    let map = p_start_cf.ln()
        + 9.0 * stay
        + alpha.ln()
        + 4.0 * (1.0 - 1.0 / delta).ln()
        + (1.0 / delta).ln()
        + (L - 1 - 14 - 1) as f64 * stay;
    assert_close(converted_region_map_log_p(&acg, &params, 0), map);
    assert_close(model.log_p(&acg, &pop), -1.0 + (-(2f64.ln()) - 0.6) + map);
}

#[test]
fn restricted_map_starting_in_a_conversion() {
    let (rho, delta) = (0.5, 8.0);
    let params = ModelParams::new(rho, delta).unwrap();
    let alpha = 0.5 * rho * 2.0 / L as f64;
    let p_start_cf = 1.0 / (alpha * delta + 1.0);

    let mut acg = pair(ConversionModel::Restricted);
    acg.add_conversion(Conversion::new(0, 0, L - 1, n(0), 0.5, n(1), 0.8))
        .unwrap();
    let expected = (1.0 - p_start_cf).ln() + (L - 1) as f64 * (1.0 - 1.0 / delta).ln();
    assert_close(converted_region_map_log_p(&acg, &params, 0), expected);
}
