//! 访问日志 / 错误日志 / 限流日志
//!
//! 访问记录是 `ACCESS_LOG_TARGET` 上的 tracing 事件，由日志系统单独写入 JSON 访问日志。
//! 限流拒绝日志经过按客户端、按窗口的节流（governor），
//! 每个窗口周期内每个客户端最多输出一条，被抑制的条数单独计数。
//! 这里的任何操作都不会让请求失败。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use governor::{DefaultKeyedRateLimiter, Quota};
use tracing::{debug, error, info, warn};

use super::rate_limit::{RateWindow, Rejection};

/// 访问日志专用 target
pub const ACCESS_LOG_TARGET: &str = "wttr_gate::access";

/// 错误告警出口
pub trait AlertSink: Send + Sync {
    fn alert(&self, message: &str);
}

/// 默认告警：写到单独的 tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, message: &str) {
        error!(target: "wttr_gate::alert", "{}", message);
    }
}

/// 一次请求的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Served {
        location: String,
        backend: &'static str,
        cached: bool,
    },
    Blocked,
    /// 请求的地名不存在（客户端错误，不告警）
    NotFound {
        location: String,
    },
    RateLimited {
        window: String,
    },
    Failed {
        code: &'static str,
    },
}

impl AccessOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            AccessOutcome::Served { .. } => "served",
            AccessOutcome::Blocked => "blocked",
            AccessOutcome::NotFound { .. } => "not_found",
            AccessOutcome::RateLimited { .. } => "rate_limited",
            AccessOutcome::Failed { .. } => "failed",
        }
    }
}

struct WindowThrottle {
    name: String,
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

pub struct RequestLog {
    throttles: Vec<WindowThrottle>,
    suppressed: AtomicU64,
    alert: Arc<dyn AlertSink>,
}

impl RequestLog {
    /// 每个限流窗口一个节流器，周期等于窗口时长
    pub fn new(windows: &[RateWindow], alert: Arc<dyn AlertSink>) -> Self {
        let throttles = windows
            .iter()
            .map(|window| WindowThrottle {
                name: window.name.clone(),
                limiter: Quota::with_period(window.duration).map(DefaultKeyedRateLimiter::keyed),
            })
            .collect();

        Self {
            throttles,
            suppressed: AtomicU64::new(0),
            alert,
        }
    }

    pub fn access(&self, identity: &str, outcome: &AccessOutcome) {
        match outcome {
            AccessOutcome::Served {
                location,
                backend,
                cached,
            } => info!(
                target: ACCESS_LOG_TARGET,
                client = %identity,
                outcome = outcome.status(),
                location = %location,
                backend = *backend,
                cache = if *cached { "HIT" } else { "MISS" }
            ),
            AccessOutcome::NotFound { location } => info!(
                target: ACCESS_LOG_TARGET,
                client = %identity,
                outcome = outcome.status(),
                location = %location
            ),
            AccessOutcome::RateLimited { window } => info!(
                target: ACCESS_LOG_TARGET,
                client = %identity,
                outcome = outcome.status(),
                window = %window
            ),
            AccessOutcome::Failed { code } => info!(
                target: ACCESS_LOG_TARGET,
                client = %identity,
                outcome = outcome.status(),
                code = *code
            ),
            AccessOutcome::Blocked => info!(
                target: ACCESS_LOG_TARGET,
                client = %identity,
                outcome = outcome.status()
            ),
        }
    }

    pub fn error(&self, text: &str) {
        error!("{}", text);
        self.alert.alert(text);
    }

    /// 记录限流拒绝；返回该消息是否真正输出
    pub fn rate_limited(&self, identity: &str, rejection: &Rejection) -> bool {
        let allowed = match self.throttles.get(rejection.window_index) {
            Some(WindowThrottle {
                limiter: Some(limiter),
                ..
            }) => limiter.check_key(&identity.to_string()).is_ok(),
            _ => true,
        };

        if allowed {
            warn!(
                "Too many queries from {}: {} window exceeded (limit {} per {}s, retry in {}s)",
                identity,
                rejection.window.name,
                rejection.window.max_count,
                rejection.window.duration.as_secs(),
                rejection.retry_after.as_secs()
            );
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// 清理节流器中已恢复满额的 key
    pub fn shrink(&self) {
        for throttle in &self.throttles {
            if let Some(limiter) = &throttle.limiter {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                debug!(
                    "Log throttle '{}' tracks {} clients",
                    throttle.name,
                    limiter.len()
                );
            }
        }
    }
}
