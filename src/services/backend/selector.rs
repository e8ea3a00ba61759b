//! 后端选择与代理缓存
//!
//! 启动时根据 WWO key 是否存在选定模式，之后不再变化。
//! 每次取数先查 proxy 缓存，未命中时发起一次有超时的上游请求；
//! 只缓存成功结果，失败不重试。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::metno::MetNoBackend;
use super::wwo::WwoBackend;
use super::{BackendMode, WeatherBackend, WeatherLocation, WeatherQuery};
use crate::cache::{CachePurpose, CacheStore};
use crate::config::{AppConfig, Credentials};
use crate::errors::{Result, WttrError};

/// 返回给调用方的天气数据
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Bytes,
    pub backend: &'static str,
    pub cached: bool,
}

pub struct BackendSelector {
    mode: BackendMode,
    backend: Arc<dyn WeatherBackend>,
    cache: Arc<CacheStore>,
    ttl: Duration,
    timeout: Duration,
}

impl BackendSelector {
    pub fn from_config(
        config: &AppConfig,
        credentials: &Credentials,
        cache: Arc<CacheStore>,
    ) -> Self {
        let upstream = &config.upstream;
        let user_agent = upstream.effective_user_agent();

        let (mode, backend): (BackendMode, Arc<dyn WeatherBackend>) = match &credentials.wwo {
            Some(key) => (
                BackendMode::Primary,
                Arc::new(WwoBackend::new(
                    upstream.wwo_url.clone(),
                    key.clone(),
                    upstream.timeout(),
                    user_agent,
                )),
            ),
            None => {
                warn!("No WWO key configured, using the met.no fallback backend");
                (
                    BackendMode::Fallback,
                    Arc::new(MetNoBackend::new(
                        upstream.metno_url.clone(),
                        upstream.timeout(),
                        user_agent,
                    )),
                )
            }
        };

        Self::with_backend(
            mode,
            backend,
            cache,
            config.cache.proxy_ttl(),
            upstream.timeout(),
        )
    }

    pub fn with_backend(
        mode: BackendMode,
        backend: Arc<dyn WeatherBackend>,
        cache: Arc<CacheStore>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        info!("Weather backend: {} ({})", backend.name(), mode);
        Self {
            mode,
            backend,
            cache,
            ttl,
            timeout,
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn accepts_place_names(&self) -> bool {
        self.backend.accepts_place_names()
    }

    fn cache_key(&self, location: &WeatherLocation, query: &WeatherQuery) -> String {
        format!(
            "{}|{}|{}",
            self.backend.name(),
            location.cache_key(),
            query.cache_key()
        )
    }

    /// 取天气数据（proxy 缓存优先）
    pub async fn fetch(&self, location: &WeatherLocation, query: &WeatherQuery) -> Result<Payload> {
        let backend_name = self.backend.name();
        let key = self.cache_key(location, query);

        if let Some(bytes) = self.cache.get(CachePurpose::Proxy, &key).await {
            debug!("Proxy cache hit: {}", key);
            return Ok(Payload {
                bytes,
                backend: backend_name,
                cached: true,
            });
        }

        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let (ttl, timeout) = (self.ttl, self.timeout);
        let location = location.clone();
        let query = query.clone();

        // 独立 task：调用方放弃时上游结果仍会写入缓存
        let handle = tokio::spawn(async move {
            let bytes = match tokio::time::timeout(timeout, backend.fetch(&location, &query)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(WttrError::backend_unavailable(format!(
                        "{}: no response within {} ms",
                        backend.name(),
                        timeout.as_millis()
                    )));
                }
            };

            if let Err(e) = cache
                .put(CachePurpose::Proxy, &key, bytes.clone(), ttl)
                .await
            {
                warn!("Failed to cache upstream response: {}", e);
            }
            Ok::<Bytes, WttrError>(bytes)
        });

        let bytes = handle.await.map_err(|e| {
            WttrError::backend_unavailable(format!("{}: fetch task failed: {}", backend_name, e))
        })??;

        Ok(Payload {
            bytes,
            backend: backend_name,
            cached: false,
        })
    }
}
