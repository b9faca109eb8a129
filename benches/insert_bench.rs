//! Benchmarks for tickstore insert and query paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;
use tickstore::config::StoreConfig;
use tickstore::store::{AggregateFunc, BucketInterval, Database, MetricRecord};

fn open_db(dir: &tempfile::TempDir) -> Database {
    let config = StoreConfig {
        path: dir.path().join("bench.db").to_string_lossy().to_string(),
        max_connections: 4,
        min_idle: 2,
        acquire_timeout_ms: 5000,
        import_batch_size: 1000,
    };
    let db = Database::open(&config).unwrap();
    db.initialize().unwrap();
    db
}

fn create_records(count: usize) -> Vec<MetricRecord> {
    (0..count)
        .map(|i| {
            MetricRecord::new("price", i as f64)
                .with_timestamp(i as i64 * 1000)
                .with_symbol("BTC/USD")
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.throughput(Throughput::Elements(1));
    group.bench_function("single", |b| {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let record = MetricRecord::new("price", 7.5).with_timestamp(1000);

        b.iter(|| db.insert_metric(black_box(&record)).unwrap());
    });

    for size in [100, 1000] {
        let records = create_records(size);

        group.throughput(Throughput::Elements(size as u64));

        // One record per statement, one transaction each
        group.bench_function(format!("looped_{}", size), |b| {
            let dir = tempdir().unwrap();
            let db = open_db(&dir);
            b.iter(|| {
                for record in &records {
                    db.insert_metric(black_box(record)).unwrap();
                }
            });
        });

        // Whole batch in a single transaction
        group.bench_function(format!("batch_{}", size), |b| {
            let dir = tempdir().unwrap();
            let db = open_db(&dir);
            b.iter(|| db.insert_metrics(black_box(&records)).unwrap());
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let dir = tempdir().unwrap();
    let db = open_db(&dir);
    db.insert_metrics(&create_records(10_000)).unwrap();

    group.bench_function("recent_100", |b| {
        b.iter(|| {
            db.get_metrics(black_box("price"), Some("BTC/USD"), None, 100)
                .unwrap()
        });
    });

    group.bench_function("aggregate_minute_avg", |b| {
        b.iter(|| {
            db.get_aggregated_metrics(
                black_box("price"),
                BucketInterval::Minute,
                None,
                AggregateFunc::Avg,
            )
            .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_query);
criterion_main!(benches);
