//! 磁盘缓存性能基准测试

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;
use wttr_gate::cache::{CachePurpose, CacheStore};
use wttr_gate::utils::SystemClock;

fn bench_proxy_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        rt.block_on(CacheStore::open(dir.path(), 1024 * 1024, Arc::new(SystemClock)))
            .unwrap(),
    );
    let payload = Bytes::from(vec![b'x'; 16 * 1024]);

    rt.block_on(async {
        store
            .put(CachePurpose::Proxy, "hit", payload.clone(), Duration::from_secs(3600))
            .await
            .unwrap();
    });

    let mut group = c.benchmark_group("cache_store/proxy_get");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    let hit = Arc::clone(&store);
    group.bench_function("hit", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&hit);
            async move { s.get(CachePurpose::Proxy, "hit").await }
        });
    });

    let miss = Arc::clone(&store);
    group.bench_function("miss", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&miss);
            async move { s.get(CachePurpose::Proxy, "missing").await }
        });
    });

    group.finish();
}

fn bench_lru_put(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        rt.block_on(CacheStore::open(dir.path(), 256 * 1024, Arc::new(SystemClock)))
            .unwrap(),
    );
    let payload = Bytes::from(vec![b'x'; 4 * 1024]);
    let counter = std::sync::atomic::AtomicU64::new(0);

    c.bench_function("cache_store/lru_put_with_eviction", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&store);
            let value = payload.clone();
            let i = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            async move {
                s.put(CachePurpose::Lru, &format!("png-{}", i), value, Duration::ZERO)
                    .await
                    .unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_proxy_get, bench_lru_put);
criterion_main!(benches);
