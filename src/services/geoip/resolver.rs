//! 按顺序尝试多个 provider 的 IP 定位器
//!
//! 解析顺序：
//! 1. 非 IP 身份直接返回 Unknown
//! 2. 查询位置缓存（命中则不调用任何 provider）
//! 3. 依次尝试 provider，每个受超时限制；第一个成功的结果写入缓存
//! 4. 全部失败或跳过时返回 Unknown，由调用方替换为默认位置
//!
//! provider 链在独立的 task 中执行，调用方放弃等待时仍会完成并写入缓存。
//!
//! 地名走另一条路径（`resolve_place`）：位置缓存 → geolocator 服务，同样在独立 task 中执行。

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::geocoder::{GeolocatorService, PlaceGeocoder};
use super::ip2location::Ip2LocationProvider;
use super::ipinfo::IpInfoProvider;
use super::maxmind::MaxMindProvider;
use super::provider::{Location, LocationProvider, ProviderError, ProviderKind};
use crate::cache::{CachePurpose, CacheStore};
use crate::config::{AppConfig, Credentials};
use crate::utils::hash_hex;
use crate::utils::ip::parse_ip;

/// 单个 provider 的尝试结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: &'static str,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Location),
    Unknown,
}

impl Resolution {
    pub fn location(&self) -> Option<&Location> {
        match self {
            Resolution::Found(location) => Some(location),
            Resolution::Unknown => None,
        }
    }
}

/// 地名解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceResolution {
    Found(Location),
    /// geolocator 明确表示不存在该地名
    NotFound,
    /// 未配置 geolocator，或本次查询失败
    Unavailable(ProviderError),
}

#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    pub resolution: Resolution,
    /// 本次解析中每个 provider 的尝试记录（缓存命中时为空）
    pub attempts: Vec<ProviderAttempt>,
    pub from_cache: bool,
}

impl ResolvedLocation {
    fn unknown(attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            resolution: Resolution::Unknown,
            attempts,
            from_cache: false,
        }
    }
}

struct ProviderChain {
    providers: Vec<Arc<dyn LocationProvider>>,
    cache: Arc<CacheStore>,
    timeout: Duration,
    ttl: Duration,
}

impl ProviderChain {
    async fn run(&self, ip: IpAddr, cache_key: String) -> ResolvedLocation {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name();
            let result = match tokio::time::timeout(self.timeout, provider.resolve(ip)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            match result {
                Ok(location) => {
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    info!(
                        "GeoIP: {} resolved by {} to {}",
                        ip,
                        name,
                        location.display_name()
                    );
                    store_location(&self.cache, &cache_key, &location, self.ttl).await;
                    return ResolvedLocation {
                        resolution: Resolution::Found(location),
                        attempts,
                        from_cache: false,
                    };
                }
                Err(e) if e.is_skip() => {
                    debug!("GeoIP: provider {} skipped for {}: {}", name, ip, e);
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Skipped(e.to_string()),
                    });
                }
                Err(e) => {
                    debug!("GeoIP: provider {} failed for {}: {}", name, ip, e);
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        debug!("GeoIP: no provider could resolve {}", ip);
        ResolvedLocation::unknown(attempts)
    }
}

struct PlaceLookup {
    geocoder: Arc<dyn PlaceGeocoder>,
    cache: Arc<CacheStore>,
    timeout: Duration,
    ttl: Duration,
}

impl PlaceLookup {
    async fn run(&self, place: String, cache_key: String) -> PlaceResolution {
        let name = self.geocoder.name();
        let result = match tokio::time::timeout(self.timeout, self.geocoder.locate(&place)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        match result {
            Ok(location) => {
                info!(
                    "Geocoding: '{}' resolved by {} to {:.4},{:.4}",
                    place, name, location.latitude, location.longitude
                );
                store_location(&self.cache, &cache_key, &location, self.ttl).await;
                PlaceResolution::Found(location)
            }
            Err(ProviderError::NotFound) => {
                debug!("Geocoding: '{}' is not a known place", place);
                PlaceResolution::NotFound
            }
            Err(e) => {
                debug!("Geocoding: {} failed for '{}': {}", name, place, e);
                PlaceResolution::Unavailable(e)
            }
        }
    }
}

async fn store_location(cache: &CacheStore, cache_key: &str, location: &Location, ttl: Duration) {
    let encoded = match serde_json::to_vec(location) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("GeoIP: failed to encode location: {}", e);
            return;
        }
    };
    if let Err(e) = cache
        .put(CachePurpose::Location, cache_key, encoded.into(), ttl)
        .await
    {
        warn!("GeoIP: failed to cache location: {}", e);
    }
}

pub struct GeoResolver {
    chain: Arc<ProviderChain>,
    /// provider 顺序指纹，写入缓存 key
    order_fingerprint: String,
    places: Option<Arc<PlaceLookup>>,
}

impl GeoResolver {
    pub fn new(
        providers: Vec<Arc<dyn LocationProvider>>,
        cache: Arc<CacheStore>,
        timeout: Duration,
        ttl: Duration,
    ) -> Self {
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        let order_fingerprint = hash_hex(&names);

        Self {
            chain: Arc::new(ProviderChain {
                providers,
                cache,
                timeout,
                ttl,
            }),
            order_fingerprint,
            places: None,
        }
    }

    /// 启用地名解析（结果与 IP 定位共用位置缓存与 TTL）
    pub fn with_geocoder(mut self, geocoder: Arc<dyn PlaceGeocoder>) -> Self {
        self.places = Some(Arc::new(PlaceLookup {
            geocoder,
            cache: Arc::clone(&self.chain.cache),
            timeout: self.chain.timeout,
            ttl: self.chain.ttl,
        }));
        self
    }

    /// 按配置的顺序构建内置 provider
    pub fn from_config(
        config: &AppConfig,
        credentials: &Credentials,
        cache: Arc<CacheStore>,
    ) -> Self {
        let geoip = &config.geoip;
        let user_agent = config.upstream.effective_user_agent();

        let mut providers: Vec<Arc<dyn LocationProvider>> = Vec::new();
        for name in &geoip.order {
            let Ok(kind) = ProviderKind::from_str(name.trim()) else {
                warn!("GeoIP: ignoring unknown provider '{}'", name);
                continue;
            };
            let provider: Arc<dyn LocationProvider> = match kind {
                ProviderKind::MaxMind => {
                    Arc::new(MaxMindProvider::open(&config.paths.geolite_db()))
                }
                ProviderKind::Ip2Location => Arc::new(Ip2LocationProvider::new(
                    geoip.ip2location_url.clone(),
                    credentials.ip2location.clone(),
                    geoip.timeout(),
                    user_agent.clone(),
                )),
                ProviderKind::IpInfo => Arc::new(IpInfoProvider::new(
                    geoip.ipinfo_url.clone(),
                    credentials.ipinfo.clone(),
                    geoip.timeout(),
                    user_agent.clone(),
                )),
            };
            providers.push(provider);
        }

        info!(
            "GeoIP: provider order [{}]",
            providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let resolver = Self::new(providers, cache, geoip.timeout(), geoip.location_ttl());
        if geoip.geolocator_url.trim().is_empty() {
            info!("Geocoding: no geolocator configured, place names are not resolved");
            return resolver;
        }
        resolver.with_geocoder(Arc::new(GeolocatorService::new(
            geoip.geolocator_url.clone(),
            geoip.timeout(),
            user_agent,
        )))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.chain.providers.iter().map(|p| p.name()).collect()
    }

    fn cache_key(&self, ip: IpAddr) -> String {
        format!("{}:{}", self.order_fingerprint, ip)
    }

    /// 解析客户端身份的地理位置
    pub async fn resolve(&self, identity: &str) -> ResolvedLocation {
        let Some(ip) = parse_ip(identity) else {
            return ResolvedLocation::unknown(Vec::new());
        };

        let cache_key = self.cache_key(ip);
        if let Some(location) = self.cached(&cache_key).await {
            return ResolvedLocation {
                resolution: Resolution::Found(location),
                attempts: Vec::new(),
                from_cache: true,
            };
        }

        let chain = Arc::clone(&self.chain);
        let handle = tokio::spawn(async move { chain.run(ip, cache_key).await });
        match handle.await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("GeoIP: resolution task for {} failed: {}", ip, e);
                ResolvedLocation::unknown(Vec::new())
            }
        }
    }

    /// 解析地名为坐标
    pub async fn resolve_place(&self, place: &str) -> PlaceResolution {
        let Some(places) = self.places.as_ref() else {
            return PlaceResolution::Unavailable(ProviderError::NotConfigured(
                "geolocator".into(),
            ));
        };

        let place = place.trim().to_string();
        let cache_key = format!("place:{}", place.to_lowercase());
        if let Some(location) = self.cached(&cache_key).await {
            return PlaceResolution::Found(location);
        }

        let places = Arc::clone(places);
        let handle = tokio::spawn(async move { places.run(place, cache_key).await });
        match handle.await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("Geocoding: lookup task failed: {}", e);
                PlaceResolution::Unavailable(ProviderError::Unavailable(e.to_string()))
            }
        }
    }

    async fn cached(&self, cache_key: &str) -> Option<Location> {
        let raw = self
            .chain
            .cache
            .get(CachePurpose::Location, cache_key)
            .await?;
        match serde_json::from_slice(&raw) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("GeoIP: dropping undecodable cached location: {}", e);
                self.chain
                    .cache
                    .remove(CachePurpose::Location, cache_key)
                    .await;
                None
            }
        }
    }
}
