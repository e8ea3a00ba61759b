use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::{AppConfig, Credentials};
use crate::errors::WttrError;
use crate::services::{
    AlertSink, BackendSelector, Blacklist, GeoResolver, LocationAliases, RateLimiter, RequestLog,
    TracingAlertSink, WeatherService,
};
use crate::utils::{Clock, SystemClock};

pub struct StartupContext {
    pub config: Arc<AppConfig>,
    pub cache: Arc<CacheStore>,
    pub service: Arc<WeatherService>,
}

/// 一次维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub idle_clients_evicted: usize,
    pub cache_entries_swept: usize,
}

/// 准备服务器启动的上下文
pub async fn prepare_server_startup(config: Arc<AppConfig>) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let context = build_context(config, Arc::new(SystemClock), Arc::new(TracingAlertSink))
        .await
        .context("Failed to assemble server components")?;

    info!(
        "Pre-startup processing completed in {:.2?}",
        start_time.elapsed()
    );
    Ok(context)
}

/// 按配置构建全部组件（时钟与告警出口可替换）
pub async fn build_context(
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
    alert: Arc<dyn AlertSink>,
) -> crate::errors::Result<StartupContext> {
    let paths = &config.paths;
    for dir in [paths.data_dir(), paths.cache_dir(), paths.log_dir()] {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            WttrError::configuration(format!("Cannot create directory {}: {}", dir.display(), e))
        })?;
    }

    let credentials = Credentials::load(&config.credentials)?;
    let blacklist = Arc::new(Blacklist::load(&paths.blacklist())?);
    let aliases = Arc::new(LocationAliases::load(&paths.aliases())?);

    let cache = Arc::new(
        CacheStore::open(paths.cache_dir(), config.cache.lru_max_bytes, clock.clone()).await?,
    );

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit, clock));
    let resolver = Arc::new(GeoResolver::from_config(
        &config,
        &credentials,
        cache.clone(),
    ));
    let backends = Arc::new(BackendSelector::from_config(
        &config,
        &credentials,
        cache.clone(),
    ));
    let log = Arc::new(RequestLog::new(limiter.windows(), alert));

    let service = Arc::new(WeatherService::new(
        blacklist,
        aliases,
        limiter,
        resolver,
        backends,
        log,
        config.geoip.default_location.clone(),
    ));

    Ok(StartupContext {
        config,
        cache,
        service,
    })
}

/// 执行一次维护：清理空闲限流状态、收缩日志节流器、清扫过期缓存
pub async fn run_maintenance(service: &WeatherService, cache: &CacheStore) -> MaintenanceReport {
    let idle_clients_evicted = service.limiter().evict_idle();
    service.request_log().shrink();
    let cache_entries_swept = cache.sweep_expired().await;

    let report = MaintenanceReport {
        idle_clients_evicted,
        cache_entries_swept,
    };
    debug!("Maintenance finished: {:?}", report);
    report
}

/// 后台定期维护任务
pub fn spawn_maintenance(context: &StartupContext) -> JoinHandle<()> {
    let service = Arc::clone(&context.service);
    let cache = Arc::clone(&context.cache);
    let period = context.config.cache.sweep_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        interval.tick().await;

        loop {
            interval.tick().await;
            run_maintenance(&service, &cache).await;
        }
    })
}
