use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use qgrid_core::{Execution, PageFetcher, Row, ServiceResult};
use qgrid_window::{DeferredSpawner, FetchCoalescer, RowWindow};
use serde_json::json;

const PAGE: usize = 50;

struct IndexFetcher;

impl PageFetcher for IndexFetcher {
    fn fetch_page(&self, _execution_id: &str, offset: usize, limit: usize) -> ServiceResult<Vec<Row>> {
        Ok((offset..offset + limit)
            .map(|i| Row::from(json!({ "id": i })))
            .collect())
    }
}

fn page(offset: usize) -> Vec<Row> {
    (offset..offset + PAGE)
        .map(|i| Row::from(json!({ "id": i, "name": format!("row {i}") })))
        .collect()
}

/// Window holding every other page of the first `pages` pages.
fn striped_window(pages: usize) -> RowWindow {
    let mut window = RowWindow::new();
    for p in (0..pages).step_by(2) {
        window.merge(p * PAGE, page(p * PAGE));
    }
    window
}

fn merge_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("window/merge");
    group.throughput(Throughput::Elements(PAGE as u64));

    for &resident in &[0_usize, 1_000, 100_000] {
        let window = striped_window(resident / PAGE * 2);
        let rows = page(resident * 2 + PAGE);
        group.bench_with_input(BenchmarkId::new("page", resident), &resident, |b, _| {
            b.iter_batched(
                || (window.clone(), rows.clone()),
                |(mut window, rows)| black_box(window.merge(resident * 2 + PAGE, rows)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn coverage_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("window/coverage");
    let window = striped_window(2_000);

    group.bench_function("contains_all_full_page", |b| {
        b.iter(|| black_box(window.contains_all(black_box(50_000..50_000 + PAGE))));
    });
    group.bench_function("contains_all_hole_page", |b| {
        b.iter(|| black_box(window.contains_all(black_box(50_050..50_050 + PAGE))));
    });
    group.bench_function("loaded_in_viewport", |b| {
        b.iter(|| black_box(window.loaded_in(black_box(49_980..50_120))));
    });

    group.finish();
}

fn ensure_loaded_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalescer/ensure_loaded");
    let exec = Execution::completed("bench", 1_000_000);

    for &span in &[50_usize, 500, 5_000] {
        group.bench_with_input(BenchmarkId::new("cold", span), &span, |b, &span| {
            b.iter_batched(
                || {
                    let spawner = DeferredSpawner::new();
                    let coalescer =
                        FetchCoalescer::new(PAGE, Arc::new(IndexFetcher), Arc::new(spawner.clone()));
                    (coalescer, spawner)
                },
                |(mut coalescer, spawner)| {
                    let report = coalescer.ensure_loaded(10_000, 10_000 + span - 1, &exec);
                    spawner.discard_all();
                    black_box(report)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, merge_bench, coverage_bench, ensure_loaded_bench);
criterion_main!(benches);
