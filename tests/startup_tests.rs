//! Startup assembly and maintenance tests

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use wttr_gate::cache::CachePurpose;
use wttr_gate::config::AppConfig;
use wttr_gate::errors::WttrError;
use wttr_gate::runtime::lifetime::startup::{StartupContext, build_context, run_maintenance};
use wttr_gate::services::{
    BackendMode, ClientIdentity, TracingAlertSink, WeatherQuery, WeatherRequest,
};
use wttr_gate::utils::{Clock, ManualClock};

fn config_in(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.root_dir = dir.path().to_path_buf();
    config
}

fn write_blacklist(dir: &TempDir, content: &str) {
    let share = dir.path().join("share");
    std::fs::create_dir_all(&share).unwrap();
    std::fs::write(share.join("blacklist"), content).unwrap();
}

async fn context(config: AppConfig, clock: Arc<ManualClock>) -> StartupContext {
    build_context(
        Arc::new(config),
        clock as Arc<dyn Clock>,
        Arc::new(TracingAlertSink),
    )
    .await
    .expect("Failed to build startup context")
}

#[tokio::test]
async fn test_missing_blacklist_is_fatal() {
    let dir = TempDir::new().unwrap();
    let result = build_context(
        Arc::new(config_in(&dir)),
        Arc::new(ManualClock::starting_now()),
        Arc::new(TracingAlertSink),
    )
    .await;

    match result {
        Err(err @ WttrError::Configuration(_)) => assert!(err.message().contains("blacklist")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("startup must fail without a blacklist"),
    }
}

#[tokio::test]
async fn test_directories_are_created() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "");
    let config = config_in(&dir);
    let ctx = context(config.clone(), Arc::new(ManualClock::starting_now())).await;

    assert!(config.paths.cache_dir().is_dir());
    assert!(config.paths.log_dir().is_dir());
    assert!(ctx.cache.dir(CachePurpose::Proxy).is_dir());
    assert!(ctx.cache.dir(CachePurpose::Location).is_dir());
}

#[tokio::test]
async fn test_fallback_backend_without_wwo_key() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "");
    let ctx = context(config_in(&dir), Arc::new(ManualClock::starting_now())).await;

    assert_eq!(ctx.service.backends().mode(), BackendMode::Fallback);
    assert_eq!(ctx.service.backends().backend_name(), "metno");
}

#[tokio::test]
async fn test_primary_backend_with_wwo_key() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "");
    let key_file = dir.path().join("wwo.key");
    std::fs::write(&key_file, "\n  test-key  \n").unwrap();

    let mut config = config_in(&dir);
    config.credentials.wwo_key_file = Some(key_file);
    let ctx = context(config, Arc::new(ManualClock::starting_now())).await;

    assert_eq!(ctx.service.backends().mode(), BackendMode::Primary);
    assert_eq!(ctx.service.backends().backend_name(), "wwo");
}

#[tokio::test]
async fn test_blacklist_file_is_applied() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "# abusers\n203.0.113.7\n");
    let ctx = context(config_in(&dir), Arc::new(ManualClock::starting_now())).await;

    let err = ctx
        .service
        .handle(WeatherRequest {
            identity: ClientIdentity::new("203.0.113.7"),
            location: None,
            query: WeatherQuery::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WttrError::Blocked(_)));
}

#[tokio::test]
async fn test_aliases_file_is_applied() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "203.0.113.7\n");
    std::fs::write(dir.path().join("share").join("aliases"), "office: 203.0.113.7\n").unwrap();
    let ctx = context(config_in(&dir), Arc::new(ManualClock::starting_now())).await;

    let err = ctx
        .service
        .handle(WeatherRequest {
            identity: ClientIdentity::new("198.51.100.9"),
            location: Some("Office".into()),
            query: WeatherQuery::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WttrError::Blocked(_)));
}

#[tokio::test]
async fn test_maintenance_evicts_idle_clients_and_sweeps_cache() {
    let dir = TempDir::new().unwrap();
    write_blacklist(&dir, "");
    let clock = Arc::new(ManualClock::starting_now());
    let ctx = context(config_in(&dir), clock.clone()).await;

    ctx.service.limiter().admit("198.51.100.9");
    ctx.cache
        .put(
            CachePurpose::Proxy,
            "metno|1.0000,1.0000|lang=en&days=3",
            Bytes::from_static(b"{}"),
            Duration::from_secs(1800),
        )
        .await
        .unwrap();
    ctx.cache
        .put(
            CachePurpose::Location,
            "k:198.51.100.9",
            Bytes::from_static(b"{}"),
            Duration::from_secs(7 * 86400),
        )
        .await
        .unwrap();

    let report = run_maintenance(&ctx.service, &ctx.cache).await;
    assert_eq!(report.idle_clients_evicted, 0);
    assert_eq!(report.cache_entries_swept, 0);

    // 超过最长窗口（一天）后客户端状态被清理，proxy 条目过期
    clock.advance(Duration::from_secs(86400 + 1));
    let report = run_maintenance(&ctx.service, &ctx.cache).await;
    assert_eq!(report.idle_clients_evicted, 1);
    assert_eq!(report.cache_entries_swept, 1);
    assert_eq!(ctx.service.limiter().tracked_clients(), 0);
    assert!(
        ctx.cache
            .get(CachePurpose::Location, "k:198.51.100.9")
            .await
            .is_some()
    );
}
