use acg_core::population::ConstantPopulation;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, ConversionModel, Locus};
use acg_mcmc::operators::{
    AddRemoveConversion, CfUniform, CfWilsonBalding, MergeSplitConversion, Operator,
    ProposalContext,
};
use acg_mcmc::{simulate_acg, AcgCoalescent, CoalescentModel, ModelParams};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn simulated(params: &ModelParams) -> ConversionGraph {
    let population = ConstantPopulation::new(1.0).unwrap();
    let mut rng = RngHandle::from_seed(17);
    let leaves = vec![0.0; 32];
    simulate_acg(
        params,
        &population,
        &leaves,
        vec![Locus::new("locus", 5_000).unwrap()],
        ConversionModel::Unrestricted,
        &mut rng,
    )
    .unwrap()
}

fn bench_operator(c: &mut Criterion, name: &str, mut operator: Box<dyn Operator>) {
    let params = ModelParams::new(0.002, 200.0).unwrap();
    let population = ConstantPopulation::new(1.0).unwrap();
    let ctx = ProposalContext::new(&population, params);
    let acg = simulated(&params);
    let mut rng = RngHandle::from_seed(3);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut trial = acg.clone();
            black_box(operator.proposal(&mut trial, &ctx, &mut rng).unwrap())
        });
    });
}

fn proposal_bench(c: &mut Criterion) {
    bench_operator(c, "add_remove", Box::new(AddRemoveConversion::new()));
    bench_operator(c, "cf_uniform", Box::new(CfUniform::default()));
    bench_operator(c, "cf_wilson_balding", Box::new(CfWilsonBalding::default()));
    bench_operator(c, "merge_split", Box::new(MergeSplitConversion::default()));

    let params = ModelParams::new(0.002, 200.0).unwrap();
    let population = ConstantPopulation::new(1.0).unwrap();
    let acg = simulated(&params);
    let prior = AcgCoalescent::new(params);
    c.bench_function("acg_coalescent_log_p", |b| {
        b.iter(|| black_box(prior.log_p(&acg, &population)));
    });
}

criterion_group!(benches, proposal_bench);
criterion_main!(benches);
