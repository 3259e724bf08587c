//! Microbenchmarks for the parse and resolve hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use perfhost::backend::sim::SimBackend;
use perfhost::backend::CounterBackend;
use perfhost::metric::parse::parse_metric_name;
use perfhost::metric::resolve::{resolve_requests, CatalogIndex};

fn catalog_names(size: usize) -> Vec<String> {
    (0..size)
        .map(|i| format!("sm__synthetic_counter_{i:04}.sum"))
        .collect()
}

fn build_index(size: usize) -> CatalogIndex {
    let names = catalog_names(size);
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let backend = SimBackend::new().with_chip("sim100", &refs);
    let ctx = backend.open_config_context("sim100").expect("open");
    CatalogIndex::from_context(ctx.as_ref()).expect("index")
}

fn bench_suite(c: &mut Criterion) {
    c.bench_function("parse_metric_name", |b| {
        b.iter(|| parse_metric_name(black_box("sm__cycles_active.sum&+")));
    });

    let index = build_index(4096);
    let requested: Vec<String> = (0..32)
        .map(|i| format!("sm__synthetic_counter_{:04}.sum", i * 100))
        .collect();
    let requested_refs: Vec<&str> = requested.iter().map(String::as_str).collect();

    c.bench_function("resolve_32_of_4096", |b| {
        b.iter(|| {
            resolve_requests(
                black_box("sim100"),
                black_box(&index),
                black_box(&requested_refs),
                false,
            )
            .expect("resolve")
        });
    });

    c.bench_function("catalog_index_build_4096", |b| {
        b.iter(|| build_index(black_box(4096)));
    });
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
