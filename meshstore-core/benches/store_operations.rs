use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use meshstore_core::config::SyncConfig;
use meshstore_core::core_data::{
    AddRequest, ManualClock, MetaDataRegistry, ProtectedData, RefreshRequest, StorageService,
};
use meshstore_core::core_identity::Keypair;
use meshstore_core::core_sync::{ProtectedDataFilter, Synchronizer};
use meshstore_core::test_utils::{keypair, test_meta, TestPayload};

const NOW: i64 = 1_700_000_000_000;

fn service() -> StorageService {
    StorageService::builder(MetaDataRegistry::from_iter([test_meta()]))
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_max_map_size(1_000_000)
        .build()
}

fn add_request(kp: &Keypair, i: usize) -> AddRequest {
    AddRequest::sign(ProtectedData::authenticated(TestPayload::new(format!("item-{}", i))), 1, NOW - i as i64, kp)
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_add");
    let kp = keypair(1);

    for batch_size in [100usize, 1_000].iter() {
        let requests: Vec<AddRequest> = (0..*batch_size).map(|i| add_request(&kp, i)).collect();
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::new("fresh_keys", batch_size), &requests, |b, requests| {
            b.iter(|| {
                let service = service();
                for req in requests {
                    black_box(service.add(req).ok());
                }
            });
        });
    }

    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_refresh");
    let kp = keypair(1);
    let add = add_request(&kp, 0);
    let key = add.map_key();
    let refreshes: Vec<RefreshRequest> = (2..1_002).map(|seq| RefreshRequest::sign(key, seq, NOW, &kp)).collect();

    group.throughput(Throughput::Elements(refreshes.len() as u64));
    group.bench_function("sequential_refresh", |b| {
        b.iter(|| {
            let service = service();
            service.add(&add).ok();
            for req in &refreshes {
                black_box(service.refresh(req).ok());
            }
        });
    });

    group.finish();
}

fn bench_inventory(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_inventory");
    group.measurement_time(Duration::from_secs(10));
    let kp = keypair(1);

    for store_size in [1_000usize, 10_000].iter() {
        let service = service();
        for i in 0..*store_size {
            service.add(&add_request(&kp, i)).ok();
        }
        let sync = Synchronizer::new(Arc::new(service), SyncConfig::default());
        let known: Vec<_> = sync
            .build_filter(TestPayload::TYPE_NAME)
            .map(|filter| filter.entries().take(store_size / 2).collect())
            .unwrap_or_default();
        let half_known = ProtectedDataFilter::with_entries(TestPayload::TYPE_NAME, known);

        group.bench_with_input(BenchmarkId::new("half_known_filter", store_size), &half_known, |b, filter| {
            b.iter(|| black_box(sync.get_inventory(filter).map(|inv| inv.len()).ok()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_refresh, bench_inventory);
criterion_main!(benches);
