//! Benchmarks for kiln core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln::core::graph::BuildGraph;
use kiln::core::matrix::expand_matrix;
use kiln::core::parser::validate_config;
use kiln::core::planner::{plan, PlanOptions};
use kiln::core::report::merge_reports;
use kiln::core::resolver::build_order;
use kiln::core::types::{KilnConfig, MergeFormat};
use kiln::runner::HostFs;
use kiln::tripwire::hasher;
use std::fmt::Write;
use std::path::Path;

/// A chain of `n` file targets, each depending on the previous one.
fn chain_config(n: usize) -> KilnConfig {
    let mut yaml = String::from("version: \"1.0\"\nname: bench\ntargets:\n");
    for i in 0..n {
        let _ = writeln!(yaml, "  t{i:04}:");
        if i > 0 {
            let _ = writeln!(yaml, "    prerequisites: [t{:04}]", i - 1);
        }
        let _ = writeln!(yaml, "    command: touch {{{{artifact}}}}");
    }
    serde_yaml_ng::from_str(&yaml).unwrap()
}

fn bench_yaml_parse(c: &mut Criterion) {
    let yaml = r#"
version: "1.0"
name: bench-config
params:
  out: build
targets:
  all:
    phony: true
    prerequisites: [test, build]
  vendor:
    prerequisites: [glide.yaml]
    command: glide install && touch vendor
    requires: [glide]
  test:
    phony: true
    order_only: [vendor]
    command: go test ./...
matrices:
  build:
    os: [linux, darwin, windows]
    arch: [amd64, arm64]
    binaries: [api, worker]
    output_dir: "{{params.out}}"
    command: go build -o {{artifact}} ./cmd/{{binary}}
    env: { GOOS: "{{os}}", GOARCH: "{{arch}}" }
"#;
    let config: KilnConfig = serde_yaml_ng::from_str(yaml).unwrap();
    assert!(validate_config(&config).is_empty(), "bench fixture must be a valid config");

    c.bench_function("yaml_parse_config", |b| {
        b.iter(|| {
            let config: KilnConfig = serde_yaml_ng::from_str(black_box(yaml)).unwrap();
            black_box(config);
        });
    });
}

fn bench_build_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_order");
    for n in [10, 100, 500] {
        let graph = BuildGraph::from_config(&chain_config(n), Path::new("/bench")).unwrap();
        let goal = format!("t{:04}", n - 1);
        group.bench_with_input(BenchmarkId::from_parameter(n), &goal, |b, goal| {
            b.iter(|| black_box(build_order(&graph, black_box(goal), &HostFs).unwrap()));
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("plan");
    for n in [10, 100] {
        let graph = BuildGraph::from_config(&chain_config(n), dir.path()).unwrap();
        for i in 0..n {
            std::fs::write(dir.path().join(format!("t{i:04}")), "").unwrap();
        }
        let goal = format!("t{:04}", n - 1);
        group.bench_with_input(BenchmarkId::from_parameter(n), &goal, |b, goal| {
            b.iter(|| {
                black_box(plan(&graph, black_box(goal), &HostFs, PlanOptions::default()).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_matrix(c: &mut Criterion) {
    let os: Vec<String> = ["linux", "darwin", "windows", "freebsd"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let arch: Vec<String> = ["amd64", "arm64", "386"].iter().map(|s| s.to_string()).collect();
    let bins: Vec<String> = (0..8).map(|i| format!("bin{i}")).collect();

    c.bench_function("expand_matrix_4x3x8", |b| {
        b.iter(|| black_box(expand_matrix(black_box(&os), &arch, &bins)));
    });
}

fn bench_merge_go_cover(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = Vec::new();
    for pkg in 0..20 {
        let mut profile = String::from("mode: count\n");
        for line in 0..200 {
            let _ = writeln!(profile, "svc/pkg{pkg}/f.go:{line}.1,{line}.40 2 1");
        }
        let path = dir.path().join(format!("pkg{pkg}.out"));
        std::fs::write(&path, profile).unwrap();
        inputs.push(path);
    }
    let output = dir.path().join("coverage.out");

    c.bench_function("merge_go_cover_20x200", |b| {
        b.iter(|| black_box(merge_reports(black_box(&inputs), &output, MergeFormat::GoCover).unwrap()));
    });
}

fn bench_blake3_file(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();

    let mut group = c.benchmark_group("blake3_file");
    for size_kb in [1, 64, 1024] {
        let path = dir.path().join(format!("bench_{size_kb}k.bin"));
        std::fs::write(&path, vec![0xABu8; size_kb * 1024]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size_kb), &path, |b, path| {
            b.iter(|| black_box(hasher::hash_file(black_box(path)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_yaml_parse,
    bench_build_order,
    bench_plan,
    bench_matrix,
    bench_merge_go_cover,
    bench_blake3_file
);
criterion_main!(benches);
