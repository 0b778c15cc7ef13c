//! Pagination loop benchmarks
//!
//! Run with: `cargo bench --bench pagination_bench -p rainbow-session`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rainbow_session::{AggregationInconsistency, PageResult, PaginatedAggregator};
use serde_json::{json, Value};

#[derive(Debug)]
struct BenchError;

impl From<AggregationInconsistency> for BenchError {
    fn from(_: AggregationInconsistency) -> Self {
        BenchError
    }
}

fn bench_fetch_all(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("tokio runtime");
    let mut group = c.benchmark_group("fetch_all");

    for total in [100_usize, 1_000, 10_000] {
        let collection: Vec<Value> = (0..total).map(|i| json!({ "id": i })).collect();
        let aggregator = PaginatedAggregator::new(100, 1_000);

        group.bench_with_input(BenchmarkId::from_parameter(total), &collection, |b, collection| {
            b.to_async(&runtime).iter(move || async move {
                let items = aggregator
                    .fetch_all(|cursor| {
                        let end = (cursor.offset + cursor.limit).min(collection.len());
                        let page = collection[cursor.offset..end].to_vec();
                        async move {
                            Ok::<_, BenchError>(PageResult { items: page, reported_total: total })
                        }
                    })
                    .await;
                black_box(items)
            });
        });
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let envelope = json!({
        "data": (0..100).map(|i| json!({ "id": format!("b-{i}") })).collect::<Vec<_>>(),
        "total": 250,
        "limit": 100,
        "offset": 0,
    });

    c.bench_function("parse_page_envelope", |b| {
        b.iter(|| {
            black_box(PageResult::from_envelope("/api/rainbow/enduser/v1.0/bubbles", envelope.clone()))
        });
    });
}

criterion_group!(benches, bench_fetch_all, bench_envelope);
criterion_main!(benches);
