//! Logging system initialization
//!
//! Two outputs:
//! - the main log (console or file, text or JSON) filtered by `logging.level`
//! - an optional JSON access log that receives only `ACCESS_LOG_TARGET` events
//!
//! When no access log file is configured, access events go to the main log.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{AppConfig, LoggingConfig};
use crate::errors::{Result, WttrError};
use crate::services::ACCESS_LOG_TARGET;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type BoxedWriter = Box<dyn Write + Send + Sync>;

/// Keeps the non-blocking writers alive; drop flushes pending records.
pub struct LoggingGuards {
    _main: WorkerGuard,
    _access: Option<WorkerGuard>,
}

/// Initialize logging system based on configuration
///
/// Must be called once, after the configuration has been loaded.
/// Relative log paths are resolved against `paths.root_dir`.
pub fn init_logging(config: &AppConfig) -> Result<LoggingGuards> {
    let logging = &config.logging;
    let main_path = resolve_log_path(&config.paths.root_dir, logging.file.as_deref());
    let access_path = resolve_log_path(&config.paths.root_dir, logging.access_file.as_deref());

    let to_console = main_path.is_none();
    let main_writer: BoxedWriter = match &main_path {
        Some(path) => open_log_writer(path, logging, "wttr-gate")?,
        None => Box::new(std::io::stdout()),
    };
    let (main_writer, main_guard) = tracing_appender::non_blocking(main_writer);

    let env_filter = EnvFilter::try_new(&logging.level).map_err(|e| {
        WttrError::configuration(format!("Invalid log level '{}': {}", logging.level, e))
    })?;
    let separate_access = access_path.is_some();
    let not_access = filter_fn(move |meta| !separate_access || meta.target() != ACCESS_LOG_TARGET);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if logging.format == "json" {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(main_writer)
                .with_filter(env_filter)
                .with_filter(not_access)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(main_writer)
                .with_level(true)
                .with_ansi(to_console)
                .with_filter(env_filter)
                .with_filter(not_access)
                .boxed(),
        );
    }

    let access_guard = match &access_path {
        Some(path) => {
            let (access_writer, guard) =
                tracing_appender::non_blocking(open_log_writer(path, logging, "access")?);
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(access_writer)
                    .with_target(false)
                    .with_filter(filter_fn(|meta| meta.target() == ACCESS_LOG_TARGET))
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| WttrError::configuration(format!("Failed to install logger: {}", e)))?;

    Ok(LoggingGuards {
        _main: main_guard,
        _access: access_guard,
    })
}

/// 空字符串视为未配置
fn resolve_log_path(root: &Path, configured: Option<&str>) -> Option<PathBuf> {
    let configured = configured.map(str::trim).filter(|p| !p.is_empty())?;
    let path = Path::new(configured);
    Some(if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    })
}

fn open_log_writer(path: &Path, logging: &LoggingConfig, fallback_name: &str) -> Result<BoxedWriter> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        WttrError::configuration(format!("Cannot create log directory {}: {}", dir.display(), e))
    })?;

    if logging.enable_rotation {
        let prefix = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(fallback_name);
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(logging.max_backups.max(1) as usize)
            .build(dir)
            .map_err(|e| {
                WttrError::configuration(format!(
                    "Failed to create rolling log appender in {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        Ok(Box::new(appender))
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                WttrError::configuration(format!("Failed to open log file {}: {}", path.display(), e))
            })?;
        Ok(Box::new(file))
    }
}
