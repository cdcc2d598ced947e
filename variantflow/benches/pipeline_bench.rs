//! Benchmarks for building and resolving the standard pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use variantflow::catalog::{standard_catalog, RUN_ALL};
use variantflow::config::ParamContext;
use variantflow::pipeline::TaskGraph;

fn pipeline_benchmark(c: &mut Criterion) {
    c.bench_function("standard_catalog", |b| {
        b.iter(|| black_box(standard_catalog()));
    });

    let Ok(catalog) = standard_catalog() else {
        return;
    };
    let params = Arc::new(
        ParamContext::new()
            .with_output_dir("/data/output")
            .with_file_parent_dir("/data/work"),
    );
    c.bench_function("resolve_run_all", |b| {
        b.iter(|| black_box(TaskGraph::resolve(&catalog, &[RUN_ALL], Arc::clone(&params))));
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
