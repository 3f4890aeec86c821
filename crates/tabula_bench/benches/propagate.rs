//! Propagation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tabula_bench::{random_cell_writes, random_renames, records, wide_document};
use tabula_core::{Base, FetchResult, HostBridge, MockHost, ResourceDescriptor, Watcher};

/// Benchmark renames with a watcher on every field name.
///
/// Two batches alternate so that every iteration changes something.
fn bench_watched_renames(c: &mut Criterion) {
    let base = Base::new(wide_document(20, 50), Arc::new(MockHost::new())).unwrap();
    let watcher = Watcher::new(|notification| {
        black_box(notification.key);
    });
    base.watch(&["schema"], &watcher).unwrap();
    for table in base.tables() {
        for field in table.fields().unwrap() {
            field.watch(&["name"], &watcher).unwrap();
        }
    }

    let mut group = c.benchmark_group("watched_renames");
    for batch_size in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let batches = [
                    random_renames(batch_size, 20, 50),
                    random_renames(batch_size, 20, 50),
                ];
                let mut turn = 0;
                b.iter(|| {
                    turn ^= 1;
                    black_box(base.apply_changes(black_box(&batches[turn])))
                });
            },
        );
    }
    group.finish();
}

/// Benchmark cell writes aggregated into `cellValues` notifications.
fn bench_cell_value_aggregation(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let host = Arc::new(MockHost::new());
    host.set_response(
        ResourceDescriptor::TableData {
            table_id: "tbl0".into(),
        },
        FetchResult::new(records(1000, 10), Vec::<String>::new()),
    );
    let base = Base::new(wide_document(1, 10), Arc::clone(&host) as Arc<dyn HostBridge>).unwrap();
    let store = base.table_by_id("tbl0").unwrap().record_store();
    runtime.block_on(store.load_data()).unwrap();

    let watcher = Watcher::new(|notification| {
        black_box(notification.args);
    });
    store.watch(&["cellValues", "cellValuesInField:fld0"], &watcher).unwrap();

    let mut group = c.benchmark_group("cell_value_aggregation");
    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let batches = [
                    random_cell_writes("tbl0", batch_size, 1000, 10),
                    random_cell_writes("tbl0", batch_size, 1000, 10),
                ];
                let mut turn = 0;
                b.iter(|| {
                    turn ^= 1;
                    black_box(base.apply_changes(black_box(&batches[turn])))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_watched_renames, bench_cell_value_aggregation);
criterion_main!(benches);
