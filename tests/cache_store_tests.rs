//! Cache store tests
//!
//! TTL expiry on a simulated clock, LRU byte bound, purpose isolation and
//! index recovery after reopening.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use wttr_gate::cache::{CachePurpose, CacheStore};
use wttr_gate::utils::{Clock, ManualClock};

async fn open(dir: &TempDir, lru_max_bytes: u64) -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = CacheStore::open(dir.path(), lru_max_bytes, clock.clone() as Arc<dyn Clock>)
        .await
        .expect("Failed to open cache store");
    (store, clock)
}

fn entry_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_ttl_expiry_on_simulated_clock() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 1024).await;

    store
        .put(
            CachePurpose::Proxy,
            "wwo|48.8566,2.3522|lang=en&days=3",
            Bytes::from_static(b"{\"weather\":[]}"),
            Duration::from_secs(1800),
        )
        .await
        .unwrap();

    clock.advance(Duration::from_secs(1799));
    assert_eq!(
        store
            .get(CachePurpose::Proxy, "wwo|48.8566,2.3522|lang=en&days=3")
            .await
            .as_deref(),
        Some(&b"{\"weather\":[]}"[..])
    );

    clock.advance(Duration::from_secs(1));
    assert!(
        store
            .get(CachePurpose::Proxy, "wwo|48.8566,2.3522|lang=en&days=3")
            .await
            .is_none()
    );
    // 过期条目在读取时被删除
    assert!(entry_files(&store.dir(CachePurpose::Proxy)).is_empty());
}

#[tokio::test]
async fn test_purposes_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open(&dir, 1024).await;
    let ttl = Duration::from_secs(60);

    store
        .put(CachePurpose::Location, "198.51.100.9", Bytes::from_static(b"location"), ttl)
        .await
        .unwrap();
    store
        .put(CachePurpose::Proxy, "198.51.100.9", Bytes::from_static(b"proxy"), ttl)
        .await
        .unwrap();

    assert_eq!(
        store.get(CachePurpose::Location, "198.51.100.9").await.as_deref(),
        Some(&b"location"[..])
    );
    assert_eq!(
        store.get(CachePurpose::Proxy, "198.51.100.9").await.as_deref(),
        Some(&b"proxy"[..])
    );
    assert!(store.get(CachePurpose::Image, "198.51.100.9").await.is_none());

    store.remove(CachePurpose::Location, "198.51.100.9").await;
    assert!(store.get(CachePurpose::Location, "198.51.100.9").await.is_none());
    assert!(store.get(CachePurpose::Proxy, "198.51.100.9").await.is_some());
}

#[tokio::test]
async fn test_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open(&dir, 1024).await;
    let ttl = Duration::from_secs(60);

    store
        .put(CachePurpose::Proxy, "k", Bytes::from_static(b"first"), ttl)
        .await
        .unwrap();
    store
        .put(CachePurpose::Proxy, "k", Bytes::from_static(b"second"), ttl)
        .await
        .unwrap();

    assert_eq!(
        store.get(CachePurpose::Proxy, "k").await.as_deref(),
        Some(&b"second"[..])
    );
    assert_eq!(entry_files(&store.dir(CachePurpose::Proxy)).len(), 1);
}

#[tokio::test]
async fn test_lru_stays_within_byte_bound() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 2048).await;
    let payload = Bytes::from(vec![b'x'; 400]);

    for i in 0..20 {
        store
            .put(
                CachePurpose::Lru,
                &format!("render-{}", i),
                payload.clone(),
                Duration::ZERO,
            )
            .await
            .unwrap();
    }

    assert!(store.lru_weighted_size() <= 2048);
    let files = entry_files(&store.dir(CachePurpose::Lru));
    assert!(files.len() < 20);
    assert_eq!(files.len() as u64, store.lru_entry_count());

    // Lru 条目没有 TTL
    clock.advance(Duration::from_secs(365 * 86400));
    assert!(store.get(CachePurpose::Lru, "render-19").await.is_some());
}

#[tokio::test]
async fn test_sweep_removes_only_expired_entries() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 1024).await;

    store
        .put(CachePurpose::Proxy, "short", Bytes::from_static(b"a"), Duration::from_secs(60))
        .await
        .unwrap();
    store
        .put(CachePurpose::Location, "long", Bytes::from_static(b"b"), Duration::from_secs(3600))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(120));
    assert_eq!(store.sweep_expired().await, 1);
    assert!(entry_files(&store.dir(CachePurpose::Proxy)).is_empty());
    assert!(store.get(CachePurpose::Location, "long").await.is_some());
}

#[tokio::test]
async fn test_corrupted_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open(&dir, 1024).await;

    store
        .put(CachePurpose::Proxy, "k", Bytes::from_static(b"value"), Duration::from_secs(60))
        .await
        .unwrap();
    let proxy_dir = store.dir(CachePurpose::Proxy);
    let name = entry_files(&proxy_dir).pop().unwrap();
    std::fs::write(proxy_dir.join(&name), b"garbage").unwrap();

    assert!(store.get(CachePurpose::Proxy, "k").await.is_none());
    assert!(entry_files(&proxy_dir).is_empty());
}

#[tokio::test]
async fn test_reopen_restores_lru_index() {
    let dir = TempDir::new().unwrap();
    {
        let (store, _clock) = open(&dir, 4096).await;
        store
            .put(CachePurpose::Lru, "kept", Bytes::from_static(b"png"), Duration::ZERO)
            .await
            .unwrap();
    }
    let lru_dir = dir.path().join(CachePurpose::Lru.dir_name());
    std::fs::write(lru_dir.join(".stale.entry.tmp"), b"partial").unwrap();

    let (store, _clock) = open(&dir, 4096).await;
    assert_eq!(store.lru_entry_count(), 1);
    assert_eq!(
        store.get(CachePurpose::Lru, "kept").await.as_deref(),
        Some(&b"png"[..])
    );
    // 上次进程遗留的临时文件被清理
    assert_eq!(entry_files(&lru_dir).len(), 1);
}

#[tokio::test]
async fn test_sub_second_ttl_rounds_up() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 1024).await;

    store
        .put(CachePurpose::Proxy, "k", Bytes::from_static(b"v"), Duration::from_millis(500))
        .await
        .unwrap();
    assert!(store.get(CachePurpose::Proxy, "k").await.is_some());

    clock.advance(Duration::from_secs(1));
    assert!(store.get(CachePurpose::Proxy, "k").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_read_keeps_concurrent_fresh_write() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 1024).await;
    let store = Arc::new(store);
    let ttl = Duration::from_secs(10);

    for i in 0..300 {
        let key = format!("wwo|{}|lang=en&days=3", i);
        store
            .put(CachePurpose::Proxy, &key, Bytes::from_static(b"old"), ttl)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(11));

        // 读者看到过期条目并删除，同时写入新条目
        let reader = {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.get(CachePurpose::Proxy, &key).await })
        };
        store
            .put(CachePurpose::Proxy, &key, Bytes::from_static(b"new"), ttl)
            .await
            .unwrap();

        assert_eq!(
            store.get(CachePurpose::Proxy, &key).await.as_deref(),
            Some(&b"new"[..]),
            "fresh entry lost in iteration {}",
            i
        );
        let seen = reader.await.unwrap();
        assert!(seen.is_none() || seen.as_deref() == Some(&b"new"[..]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_keeps_concurrent_fresh_write() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open(&dir, 1024).await;
    let store = Arc::new(store);
    let ttl = Duration::from_secs(10);

    for i in 0..100 {
        store
            .put(CachePurpose::Location, "198.51.100.9", Bytes::from_static(b"old"), ttl)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(11));

        let sweeper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.sweep_expired().await })
        };
        store
            .put(CachePurpose::Location, "198.51.100.9", Bytes::from_static(b"new"), ttl)
            .await
            .unwrap();
        sweeper.await.unwrap();

        assert_eq!(
            store.get(CachePurpose::Location, "198.51.100.9").await.as_deref(),
            Some(&b"new"[..]),
            "fresh entry swept in iteration {}",
            i
        );
    }
}
