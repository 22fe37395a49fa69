//! 缓存热路径性能测试：命中查询、满载准入（含淘汰）、槽位环

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use order_cache::domain::cache::{OrderCache, SlotRing};
use order_cache::infrastructure::storage::MemorySnapshotStore;
use order_cache::shared::fixtures::sample_order;
use std::sync::Arc;

fn filled_cache(rt: &tokio::runtime::Runtime, capacity: usize) -> (OrderCache, Vec<String>) {
    let cache = OrderCache::new(capacity, Arc::new(MemorySnapshotStore::new()))
        .expect("capacity is non-zero");
    let keys: Vec<String> = (0..capacity).map(|i| format!("order-{}", i)).collect();

    rt.block_on(async {
        for key in &keys {
            cache.admit(key, Arc::new(sample_order(key))).await;
        }
    });
    (cache, keys)
}

fn bench_get_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("OrderCache get (hit)");

    for capacity in [100, 1000, 10_000] {
        let (cache, keys) = filled_cache(&rt, capacity);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(cache.get(&keys[i]))
            });
        });
    }
    group.finish();
}

fn bench_admit_evicting(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("OrderCache admit (full, evicting)");

    for capacity in [100, 1000] {
        let (cache, _) = filled_cache(&rt, capacity);
        let order = Arc::new(sample_order("template"));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            let mut n: u64 = 0;
            b.to_async(&rt).iter(|| {
                n += 1;
                let key = format!("new-{}", n);
                let cache = &cache;
                let order = order.clone();
                async move { black_box(cache.admit(&key, order).await) }
            });
        });
    }
    group.finish();
}

fn bench_slot_ring(c: &mut Criterion) {
    c.bench_function("SlotRing install (wrapping)", |b| {
        let mut ring = SlotRing::with_capacity(1024);
        let keys: Vec<Arc<str>> = (0..4096).map(|i| Arc::from(format!("k{}", i))).collect();
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(ring.install(keys[i].clone()))
        });
    });
}

criterion_group!(benches, bench_get_hit, bench_admit_evicting, bench_slot_ring);
criterion_main!(benches);
