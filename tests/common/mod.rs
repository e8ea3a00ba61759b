//! 集成测试共用的桩实现与组装工具

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;

use wttr_gate::cache::CacheStore;
use wttr_gate::config::DefaultLocationConfig;
use wttr_gate::errors::{Result, WttrError};
use wttr_gate::services::{
    AlertSink, BackendMode, BackendSelector, Blacklist, GeoResolver, Location, LocationAliases,
    LocationProvider, PlaceGeocoder, ProviderError, RateLimiter, RateWindow, RequestLog,
    WeatherBackend, WeatherLocation, WeatherQuery, WeatherService,
};
use wttr_gate::utils::ManualClock;

// =============================================================================
// Location providers
// =============================================================================

pub struct StubProvider {
    name: &'static str,
    result: std::result::Result<(f64, f64, Option<&'static str>), ProviderError>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn ok(name: &'static str, lat: f64, lon: f64) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok((lat, lon, None)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn city(name: &'static str, lat: f64, lon: f64, city: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok((lat, lon, Some(city))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn err(name: &'static str, err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Err(err),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for StubProvider {
    async fn resolve(&self, _ip: IpAddr) -> std::result::Result<Location, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(|(latitude, longitude, city)| Location {
            latitude,
            longitude,
            city: city.map(String::from),
            region: None,
            country_code: None,
            source: self.name.to_string(),
            resolved_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// =============================================================================
// Place geocoder
// =============================================================================

/// 认识 Berlin 和 Paris；`down()` 模拟服务不可用
pub struct StubGeocoder {
    down: bool,
    calls: AtomicUsize,
}

impl StubGeocoder {
    pub fn known() -> Arc<Self> {
        Arc::new(Self {
            down: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            down: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceGeocoder for StubGeocoder {
    async fn locate(&self, place: &str) -> std::result::Result<Location, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(ProviderError::Unavailable("connection refused".into()));
        }
        let (latitude, longitude) = match place.to_lowercase().as_str() {
            "berlin" => (52.52, 13.405),
            "paris" => (48.8566, 2.3522),
            _ => return Err(ProviderError::NotFound),
        };
        Ok(Location {
            latitude,
            longitude,
            city: Some(place.to_string()),
            region: None,
            country_code: None,
            source: "geolocator".to_string(),
            resolved_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "geolocator"
    }
}

// =============================================================================
// Weather backend
// =============================================================================

pub struct StubBackend {
    fail: bool,
    delay: Duration,
    accepts_names: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<(WeatherLocation, WeatherQuery)>>,
}

impl StubBackend {
    pub fn ok() -> Arc<Self> {
        Self::build(false, Duration::ZERO, false)
    }

    /// 可以直接按地名查询，类似 wwo
    pub fn accepting_names() -> Arc<Self> {
        Self::build(false, Duration::ZERO, true)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(true, Duration::ZERO, false)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(false, delay, false)
    }

    fn build(fail: bool, delay: Duration, accepts_names: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            delay,
            accepts_names,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_location(&self) -> Option<WeatherLocation> {
        self.seen.lock().last().map(|(location, _)| location.clone())
    }

    pub fn last_query(&self) -> Option<WeatherQuery> {
        self.seen.lock().last().map(|(_, query)| query.clone())
    }
}

#[async_trait]
impl WeatherBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn accepts_place_names(&self) -> bool {
        self.accepts_names
    }

    async fn fetch(&self, location: &WeatherLocation, query: &WeatherQuery) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((location.clone(), query.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(WttrError::backend_unavailable("stub: HTTP 502"));
        }
        Ok(Bytes::from(format!(
            r#"{{"location":"{}","lang":"{}"}}"#,
            location.cache_key(),
            query.lang
        )))
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Default)]
pub struct RecordingAlertSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlertSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn alert(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

// =============================================================================
// Pipeline assembly
// =============================================================================

pub fn default_location() -> DefaultLocationConfig {
    DefaultLocationConfig {
        name: "oymyakon".into(),
        latitude: 63.4608,
        longitude: 142.7858,
    }
}

pub struct PipelineBuilder {
    providers: Vec<Arc<StubProvider>>,
    backend: Arc<StubBackend>,
    windows: Vec<RateWindow>,
    blacklist: Vec<&'static str>,
    geocoder: Option<Arc<StubGeocoder>>,
    aliases: &'static str,
    proxy_ttl: Duration,
    location_ttl: Duration,
    upstream_timeout: Duration,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            providers: vec![StubProvider::ok("geoip", 48.8566, 2.3522)],
            backend: StubBackend::ok(),
            windows: vec![RateWindow::new("minute", Duration::from_secs(60), 1000)],
            blacklist: Vec::new(),
            geocoder: Some(StubGeocoder::known()),
            aliases: "",
            proxy_ttl: Duration::from_secs(1800),
            location_ttl: Duration::from_secs(86400),
            upstream_timeout: Duration::from_secs(2),
        }
    }
}

impl PipelineBuilder {
    pub fn providers(mut self, providers: Vec<Arc<StubProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn backend(mut self, backend: Arc<StubBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn windows(mut self, windows: &[(&str, u64, u64)]) -> Self {
        self.windows = windows
            .iter()
            .map(|(name, secs, max)| RateWindow::new(*name, Duration::from_secs(*secs), *max))
            .collect();
        self
    }

    pub fn blacklist(mut self, entries: &[&'static str]) -> Self {
        self.blacklist = entries.to_vec();
        self
    }

    pub fn geocoder(mut self, geocoder: Option<Arc<StubGeocoder>>) -> Self {
        self.geocoder = geocoder;
        self
    }

    /// 别名文件内容
    pub fn aliases(mut self, content: &'static str) -> Self {
        self.aliases = content;
        self
    }

    pub fn proxy_ttl(mut self, ttl: Duration) -> Self {
        self.proxy_ttl = ttl;
        self
    }

    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub async fn build(self) -> Pipeline {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(
            CacheStore::open(dir.path().join("cache"), 1024 * 1024, clock.clone())
                .await
                .expect("Failed to open cache store"),
        );

        let limiter = Arc::new(RateLimiter::new(self.windows, clock.clone()));
        let mut resolver = GeoResolver::new(
            self.providers
                .iter()
                .map(|p| Arc::clone(p) as Arc<dyn LocationProvider>)
                .collect(),
            cache.clone(),
            Duration::from_secs(1),
            self.location_ttl,
        );
        if let Some(geocoder) = &self.geocoder {
            resolver = resolver.with_geocoder(geocoder.clone() as Arc<dyn PlaceGeocoder>);
        }
        let resolver = Arc::new(resolver);
        let backends = Arc::new(BackendSelector::with_backend(
            BackendMode::Fallback,
            self.backend.clone() as Arc<dyn WeatherBackend>,
            cache.clone(),
            self.proxy_ttl,
            self.upstream_timeout,
        ));
        let alerts = Arc::new(RecordingAlertSink::default());
        let log = Arc::new(RequestLog::new(
            limiter.windows(),
            alerts.clone() as Arc<dyn AlertSink>,
        ));

        let service = Arc::new(WeatherService::new(
            Arc::new(Blacklist::from_entries(self.blacklist)),
            Arc::new(LocationAliases::parse(self.aliases)),
            limiter,
            resolver,
            backends,
            log,
            default_location(),
        ));

        Pipeline {
            _dir: dir,
            clock,
            cache,
            service,
            providers: self.providers,
            geocoder: self.geocoder,
            backend: self.backend,
            alerts,
        }
    }
}

pub struct Pipeline {
    _dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheStore>,
    pub service: Arc<WeatherService>,
    pub providers: Vec<Arc<StubProvider>>,
    pub geocoder: Option<Arc<StubGeocoder>>,
    pub backend: Arc<StubBackend>,
    pub alerts: Arc<RecordingAlertSink>,
}

impl Pipeline {
    pub fn provider_calls(&self) -> usize {
        self.providers.iter().map(|p| p.calls()).sum()
    }

    pub fn geocoder_calls(&self) -> usize {
        self.geocoder.as_ref().map_or(0, |g| g.calls())
    }
}
