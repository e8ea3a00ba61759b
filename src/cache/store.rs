//! 按用途分目录的磁盘缓存
//!
//! - Location / Image / Proxy：基于 TTL，读取时惰性删除过期条目，后台定期清扫
//! - Lru：按总字节数限制，内存索引（moka，LRU 策略）决定淘汰，被淘汰的条目同步删除文件
//!
//! 写入先落到唯一的临时文件再 rename，读者不会看到写了一半的条目；
//! 同一 key 的并发写入以最后一次 rename 为准。
//! 删除过期条目时持有该条目的分段锁并重新读取文件头，
//! 与 rename 互斥，因此不会误删并发写入的新条目。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::notification::RemovalCause;
use strum::IntoEnumIterator;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::entry::{CacheEntry, EntryHeader};
use super::purpose::{CachePurpose, EvictionPolicy};
use crate::errors::{Result, WttrError};
use crate::utils::{Clock, hash_hex};

const ENTRY_SUFFIX: &str = ".entry";
const LOCK_STRIPES: usize = 64;

pub struct CacheStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    /// LRU 目录的文件名 → 字节数
    lru_index: moka::sync::Cache<String, u64>,
    /// 按文件名分段：提交（rename）与删除互斥
    entry_locks: Box<[Mutex<()>]>,
}

impl CacheStore {
    /// 打开缓存根目录，创建各用途子目录，并从磁盘重建 LRU 索引
    pub async fn open(
        root: impl Into<PathBuf>,
        lru_max_bytes: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let root = root.into();
        for purpose in CachePurpose::iter() {
            let dir = root.join(purpose.dir_name());
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                WttrError::configuration(format!(
                    "Cannot create cache directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let lru_dir = root.join(CachePurpose::Lru.dir_name());
        let listener_dir = lru_dir.clone();
        let lru_index = moka::sync::Cache::builder()
            .max_capacity(lru_max_bytes)
            .weigher(|_name: &String, size: &u64| -> u32 { (*size).try_into().unwrap_or(u32::MAX) })
            .eviction_policy(moka::policy::EvictionPolicy::lru())
            .eviction_listener(move |name: Arc<String>, _size: u64, cause: RemovalCause| {
                if cause.was_evicted() {
                    let path = listener_dir.join(name.as_str());
                    if let Err(e) = std::fs::remove_file(&path)
                        && e.kind() != ErrorKind::NotFound
                    {
                        warn!("Failed to remove evicted LRU entry {}: {}", path.display(), e);
                    }
                }
            })
            .build();

        let store = Self {
            root,
            clock,
            lru_index,
            entry_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        };
        let restored = store.rebuild_lru_index(&lru_dir).await;
        info!(
            "Cache store opened at {} ({} LRU entries restored, limit {} bytes)",
            store.root.display(),
            restored,
            lru_max_bytes
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 某个用途的存储目录
    pub fn dir(&self, purpose: CachePurpose) -> PathBuf {
        self.root.join(purpose.dir_name())
    }

    fn entry_name(purpose: CachePurpose, key: &str) -> String {
        format!("{}{}", hash_hex(&[purpose.as_ref(), key]), ENTRY_SUFFIX)
    }

    fn entry_lock(&self, name: &str) -> &Mutex<()> {
        let stripe = xxhash_rust::xxh64::xxh64(name.as_bytes(), 0) as usize % self.entry_locks.len();
        &self.entry_locks[stripe]
    }

    /// 读取缓存；过期、损坏或不存在都视为 miss
    pub async fn get(&self, purpose: CachePurpose, key: &str) -> Option<Bytes> {
        let name = Self::entry_name(purpose, key);
        let policy = purpose.eviction_policy();

        if policy == EvictionPolicy::LeastRecentlyUsed && self.lru_index.get(&name).is_none() {
            return None;
        }

        let path = self.dir(purpose).join(&name);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to read cache entry {}: {}", path.display(), e);
                }
                if policy == EvictionPolicy::LeastRecentlyUsed {
                    self.lru_index.invalidate(&name);
                }
                return None;
            }
        };

        let entry = match CacheEntry::decode(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Corrupted cache entry {}: {}, removing", path.display(), e);
                self.discard_stale(purpose, &name, &path).await;
                return None;
            }
        };

        if entry.header.key != key {
            debug!("Cache key collision in {} for {}", purpose, key);
            return None;
        }

        if policy == EvictionPolicy::Ttl && entry.header.is_expired(self.clock.now()) {
            trace!("Cache entry expired: {}/{}", purpose, key);
            self.discard_stale(purpose, &name, &path).await;
            return None;
        }

        Some(entry.value)
    }

    /// 写入缓存
    ///
    /// `ttl` 对 Lru 用途无效，Lru 只按容量淘汰。
    pub async fn put(
        &self,
        purpose: CachePurpose,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<()> {
        let name = Self::entry_name(purpose, key);
        let dir = self.dir(purpose);
        let path = dir.join(&name);
        let tmp_path = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

        let ttl_secs = match purpose.eviction_policy() {
            // 不足一秒按一秒计，避免写入即过期
            EvictionPolicy::Ttl => Some(ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)),
            EvictionPolicy::LeastRecentlyUsed => None,
        };
        let entry = CacheEntry {
            header: EntryHeader {
                key: key.to_string(),
                stored_at: self.clock.now(),
                ttl_secs,
            },
            value,
        };
        let encoded = entry.encode()?;
        let size = encoded.len() as u64;

        tokio::fs::write(&tmp_path, &encoded).await.map_err(|e| {
            WttrError::file_operation(format!(
                "Failed to write cache entry {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        let committed = {
            let _guard = self.entry_lock(&name).lock().await;
            tokio::fs::rename(&tmp_path, &path).await
        };
        if let Err(e) = committed {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(WttrError::file_operation(format!(
                "Failed to commit cache entry {}: {}",
                path.display(),
                e
            )));
        }

        if purpose.eviction_policy() == EvictionPolicy::LeastRecentlyUsed {
            self.lru_index.insert(name, size);
        }

        trace!("Cached {}/{} ({} bytes)", purpose, key, size);
        Ok(())
    }

    /// 删除缓存条目（不存在时忽略）
    pub async fn remove(&self, purpose: CachePurpose, key: &str) {
        let name = Self::entry_name(purpose, key);
        let path = self.dir(purpose).join(&name);
        let _guard = self.entry_lock(&name).lock().await;
        self.unlink(purpose, &name, &path).await;
    }

    /// 删除过期或损坏的条目
    ///
    /// 持锁后重新读取文件头：若该路径已被并发写入替换为未过期的条目则保留。
    /// 返回是否删除。
    async fn discard_stale(&self, purpose: CachePurpose, name: &str, path: &Path) -> bool {
        let _guard = self.entry_lock(name).lock().await;
        match read_header(path).await {
            Some(header) if !header.is_expired(self.clock.now()) => {
                trace!("Cache entry {} was replaced, keeping it", path.display());
                false
            }
            _ => self.unlink(purpose, name, path).await,
        }
    }

    async fn unlink(&self, purpose: CachePurpose, name: &str, path: &Path) -> bool {
        if purpose.eviction_policy() == EvictionPolicy::LeastRecentlyUsed {
            self.lru_index.invalidate(name);
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove cache entry {}: {}", path.display(), e);
                }
                false
            }
        }
    }

    /// 清扫所有 TTL 目录中的过期条目，返回删除数量
    pub async fn sweep_expired(&self) -> usize {
        let mut removed = 0;

        for purpose in CachePurpose::iter() {
            if purpose.eviction_policy() != EvictionPolicy::Ttl {
                continue;
            }

            let dir = self.dir(purpose);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cache sweep cannot read {}: {}", dir.display(), e);
                    continue;
                }
            };

            while let Ok(Some(dir_entry)) = entries.next_entry().await {
                let path = dir_entry.path();
                let Some(name) = entry_file_name(&path) else {
                    continue;
                };
                if self.discard_stale(purpose, &name, &path).await {
                    removed += 1;
                }
            }
        }

        self.lru_index.run_pending_tasks();
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    /// LRU 目录当前占用的字节数（按索引统计）
    pub fn lru_weighted_size(&self) -> u64 {
        self.lru_index.run_pending_tasks();
        self.lru_index.weighted_size()
    }

    pub fn lru_entry_count(&self) -> u64 {
        self.lru_index.run_pending_tasks();
        self.lru_index.entry_count()
    }

    async fn rebuild_lru_index(&self, lru_dir: &Path) -> usize {
        let mut restored = 0;
        let Ok(mut entries) = tokio::fs::read_dir(lru_dir).await else {
            return 0;
        };

        while let Ok(Some(dir_entry)) = entries.next_entry().await {
            let path = dir_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if name.starts_with('.') {
                // 上次进程遗留的临时文件
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
            if !name.ends_with(ENTRY_SUFFIX) {
                continue;
            }
            if let Ok(meta) = dir_entry.metadata().await {
                self.lru_index.insert(name, meta.len());
                restored += 1;
            }
        }

        self.lru_index.run_pending_tasks();
        restored
    }
}

fn entry_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.') && n.ends_with(ENTRY_SUFFIX))
        .map(String::from)
}

async fn read_header(path: &Path) -> Option<EntryHeader> {
    let file = tokio::fs::File::open(path).await.ok()?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    serde_json::from_str(line.trim_end()).ok()
}
