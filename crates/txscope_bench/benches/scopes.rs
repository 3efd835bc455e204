//! Scope lifecycle benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use txscope_bench::{nested_commit_in_flow, payload};
use txscope_core::{flow, ScopeFactory, ScopeOptions, ScopeResult};
use txscope_resource::{InMemoryResource, InMemoryResourceFactory};

fn scopes() -> ScopeFactory<InMemoryResourceFactory> {
    ScopeFactory::new(InMemoryResourceFactory::default())
}

/// Benchmark creating and disposing nested scopes.
fn bench_nesting_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("nesting_depth");
    let value = payload(64);

    for depth in [1usize, 2, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let scopes = scopes();
            b.iter(|| {
                let opened = nested_commit_in_flow(&scopes, black_box(depth), 0, &value).unwrap();
                black_box(opened);
            });
        });
    }

    group.finish();
}

/// Benchmark committing writes through a nested scope.
fn bench_commit_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_writes");
    let value = payload(256);

    for writes in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*writes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, &writes| {
            let scopes = scopes();
            b.iter(|| {
                let opened = nested_commit_in_flow(&scopes, 2, black_box(writes), &value).unwrap();
                black_box(opened);
            });
        });
    }

    group.finish();
}

/// Benchmark the ambient resource lookup.
fn bench_accessor(c: &mut Criterion) {
    let scopes = scopes();
    c.bench_function("accessor_current", |b| {
        flow::scope_sync(|| {
            let scope = scopes.create_read_only().unwrap();
            b.iter(|| {
                let resource = txscope_core::ResourceAccessor::current::<InMemoryResource>().unwrap();
                black_box(resource);
            });
            scope.dispose().unwrap();
        });
    });
}

/// Benchmark `execute` with async disposal.
fn bench_execute(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let scopes = scopes();
    let value = payload(64);

    c.bench_function("execute_commit", |b| {
        b.iter(|| {
            runtime
                .block_on(scopes.execute(ScopeOptions::default(), || async {
                    let resource = txscope_core::ResourceAccessor::current::<InMemoryResource>()?;
                    resource.put("bench", "key", value.clone())?;
                    ScopeResult::Ok(())
                }))
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_nesting_depth,
    bench_commit_writes,
    bench_accessor,
    bench_execute
);
criterion_main!(benches);
