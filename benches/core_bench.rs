//! Benchmarks for tempmon core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempmon::core::types::{Dimension, StackConfig};
use tempmon::core::{parser, planner, stack, synth, template};
use tempmon::tripwire::hasher;

fn bench_blake3_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_string");
    for size in [64, 256, 1024, 4096] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(hasher::hash_string(black_box(input))));
        });
    }
    group.finish();
}

fn bench_config_parse(c: &mut Criterion) {
    let yaml = r#"
version: "1.0"
name: TempMonitorStack
description: bench stack
rule:
  sql: "SELECT * FROM 'site/+/room/+/reading'"
  dimensions:
    - { name: site, value: "${topic(2)}" }
    - { name: room, value: "${topic(4)}" }
    - { name: deviceId, value: "${clientid()}" }
    - { name: temperature, value: "${temperature}" }
"#;

    c.bench_function("config_parse_validate", |b| {
        b.iter(|| {
            let config = parser::parse_config(black_box(yaml)).unwrap();
            black_box(parser::validate_config(&config));
        });
    });
}

fn bench_declare_synth(c: &mut Criterion) {
    let mut group = c.benchmark_group("declare_synth");
    for dims in [1, 8, 32] {
        let mut config = StackConfig::default();
        config.rule.dimensions = (0..dims)
            .map(|i| Dimension::new(&format!("dim{i}"), "${topic(2)}"))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(dims), &config, |b, config| {
            b.iter(|| {
                let graph = stack::declare_stack(black_box(config)).unwrap();
                black_box(synth::synthesize(&graph));
            });
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let graph = stack::declare_stack(&StackConfig::default()).unwrap();
    let t = synth::synthesize(&graph);
    c.bench_function("render_template", |b| {
        b.iter(|| black_box(synth::render(black_box(&t)).unwrap()));
    });
}

fn bench_deploy_order(c: &mut Criterion) {
    let graph = stack::declare_stack(&StackConfig::default()).unwrap();
    c.bench_function("deploy_order", |b| {
        b.iter(|| black_box(planner::deploy_order(black_box(&graph)).unwrap()));
    });
}

fn bench_parse_template(c: &mut Criterion) {
    let value = "${topic(2)}-${clientid()}-${temperature}-${timestamp()}";
    c.bench_function("parse_template", |b| {
        b.iter(|| black_box(template::parse_template(black_box(value)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_blake3_string,
    bench_config_parse,
    bench_declare_synth,
    bench_render,
    bench_deploy_order,
    bench_parse_template,
);
criterion_main!(benches);
