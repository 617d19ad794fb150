//! Benchmarks for the hot channel-document operations.
//!
//! These cover the per-push work the engine does while holding a channel
//! lease: connector grouping, history append with trim, and window reads.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tannoy_core::ChannelDoc;

fn doc_with_members(members: usize, connectors: usize) -> ChannelDoc {
    let mut doc = ChannelDoc::new("area:bench");
    for i in 0..members {
        doc.set_connector(format!("player-{i}"), format!("conn-{}", i % connectors));
    }
    doc
}

/// Benchmark grouping a broadcast by connector.
fn bench_connector_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("connector_groups");

    for size in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let doc = doc_with_members(size, 8);
            b.iter(|| black_box(doc.connector_groups(None)));
        });
    }

    group.finish();
}

/// Benchmark targeted grouping against a large membership.
fn bench_targeted_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("targeted_groups");

    let doc = doc_with_members(10000, 8);
    let recipients: Vec<String> = (0..100).map(|i| format!("player-{}", i * 100)).collect();
    group.throughput(Throughput::Elements(recipients.len() as u64));
    group.bench_function("100_of_10000", |b| {
        b.iter(|| black_box(doc.connector_groups(Some(&recipients))));
    });

    group.finish();
}

/// Benchmark history append with the trim-on-overflow path hot.
fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    group.bench_function("append_trim", |b| {
        let mut doc = ChannelDoc::new("area:bench");
        b.iter(|| doc.append_history("chat.msg", json!({"text": "hi"}), 100));
    });

    group.bench_function("window_full", |b| {
        let mut doc = ChannelDoc::new("area:bench");
        for _ in 0..100 {
            doc.append_history("chat.msg", json!({"text": "hi"}), 100);
        }
        b.iter(|| black_box(doc.history_window(black_box(50), 100)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_connector_groups,
    bench_targeted_groups,
    bench_history,
);
criterion_main!(benches);
