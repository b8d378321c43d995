use std::fs;

use acg_core::population::SkylineShape;
use acg_graph::ConversionModel;
use acg_mcmc::{PopulationConfig, RunConfig};
use tempfile::tempdir;

#[test]
fn empty_document_uses_defaults() {
    let config = RunConfig::from_yaml_str("{}").unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.steps, 1_000);
    assert_eq!(config.model.rho, 0.01);
    assert_eq!(config.model.delta, 50.0);
    assert_eq!(config.model.conversion_model, ConversionModel::Unrestricted);
    assert_eq!(config.population, PopulationConfig::Constant { size: 1.0 });
    assert_eq!(config.checkpoint.interval, 0);
}

#[test]
fn parses_a_full_document() {
    let yaml = r#"
steps: 500
sample_interval: 5
model:
  rho: 0.2
  delta: 30
  conversion_model: restricted
  count_bounds:
    lower: 1
    upper: 40
population:
  type: skyline
  boundaries: [0.0, 0.5, 2.0]
  sizes: [1.0, 0.3, 2.0]
  shape: piecewise-linear
operators:
  weights:
    detour: 0.0
    cf_swap: 2.5
  tuning:
    aperture: 0.05
seed_policy:
  master_seed: 99
"#;
    let config = RunConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.steps, 500);
    assert_eq!(config.model.conversion_model, ConversionModel::Restricted);
    assert_eq!(config.model.count_bounds.upper, Some(40));
    match &config.population {
        PopulationConfig::Skyline { sizes, shape, .. } => {
            assert_eq!(sizes.len(), 3);
            assert_eq!(*shape, SkylineShape::PiecewiseLinear);
        }
        other => panic!("unexpected population {other:?}"),
    }
    assert_eq!(config.operators.weights.detour, 0.0);
    assert_eq!(config.operators.weights.add_remove, 1.0);
    assert_eq!(config.operators.tuning.aperture, 0.05);
    assert_eq!(config.seed_policy.master_seed, 99);

    let params = config.model.params().unwrap();
    assert_eq!(params.rho, 0.2);
    assert!(config.population.build().is_ok());
}

#[test]
fn yaml_round_trip_preserves_the_config() {
    let mut config = RunConfig::default();
    config.steps = 42;
    config.operators.weights.merge_split = 3.0;
    let yaml = config.to_yaml_string().unwrap();
    assert_eq!(RunConfig::from_yaml_str(&yaml).unwrap(), config);
}

#[test]
fn rejects_invalid_values() {
    let cases = [
        ("steps: 0", "invalid-steps"),
        ("sample_interval: 0", "invalid-sample-interval"),
        ("operators: {weights: {cf_uniform: -1.0}}", "invalid-weight"),
        ("operators: {tuning: {scale_factor: 1.0}}", "invalid-tuning"),
        ("operators: {tuning: {expected_gap: 0.5}}", "invalid-tuning"),
        ("operators: {tuning: {height_window: 0.0}}", "invalid-tuning"),
        ("model: {delta: 0.5}", "invalid-delta"),
        ("steps: [1, 2]", "config-parse"),
    ];
    for (yaml, code) in cases {
        let err = RunConfig::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.code(), code, "{yaml}");
    }
}

#[test]
fn all_zero_weights_leave_no_operator() {
    let yaml = r#"
operators:
  weights:
    add_remove: 0
    cf_uniform: 0
    cf_wilson_balding: 0
    merge_split: 0
    cf_swap: 0
    region_shift: 0
    boundary_shift: 0
    pair_boundary_shift: 0
    detour: 0
    edge_slide: 0
    edge_hop: 0
    edge_flip: 0
    replace: 0
    redundant: 0
    scaler: 0
"#;
    let err = RunConfig::from_yaml_str(yaml).unwrap_err();
    assert_eq!(err.code(), "no-operators");
}

#[test]
fn invalid_skyline_is_a_config_error() {
    let yaml = r#"
population:
  type: skyline
  boundaries: [0.5, 1.0]
  sizes: [1.0, 2.0]
"#;
    let err = RunConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, acg_core::errors::AcgError::Config(_)));
}

#[test]
fn loads_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, "steps: 12\nmodel:\n  rho: 0.5\n").unwrap();
    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.steps, 12);
    assert_eq!(config.model.rho, 0.5);

    let missing = RunConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
    assert_eq!(missing.code(), "config-read");
}
