//! 按客户端的多窗口查询限流
//!
//! 固定窗口：窗口从该客户端在窗口内的第一次请求开始计时，时长耗尽后整体清零。
//! 每次请求都会累加所有窗口的计数，即使靠前的窗口已经拒绝（不回滚）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::{RateLimitConfig, WindowConfig};
use crate::utils::{Clock, elapsed_between};

/// 单个限流窗口：时长 + 窗口内最大请求数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub name: String,
    pub duration: Duration,
    pub max_count: u64,
}

impl RateWindow {
    pub fn new(name: impl Into<String>, duration: Duration, max_count: u64) -> Self {
        Self {
            name: name.into(),
            duration,
            max_count,
        }
    }
}

impl From<&WindowConfig> for RateWindow {
    fn from(config: &WindowConfig) -> Self {
        Self::new(
            config.name.clone(),
            Duration::from_secs(config.duration_secs),
            config.max_queries,
        )
    }
}

/// 被拒绝的原因：第一个超限的窗口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub window_index: usize,
    pub window: RateWindow,
    /// 距离该窗口重置的剩余时间
    pub retry_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Clone)]
struct WindowCounter {
    started_at: DateTime<Utc>,
    count: u64,
}

#[derive(Debug, Clone)]
struct ClientState {
    counters: Vec<WindowCounter>,
    last_seen: DateTime<Utc>,
}

pub struct RateLimiter {
    windows: Arc<[RateWindow]>,
    clients: DashMap<String, ClientState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(windows: Vec<RateWindow>, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: windows.into(),
            clients: DashMap::new(),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.windows.iter().map(RateWindow::from).collect(), clock)
    }

    pub fn windows(&self) -> &[RateWindow] {
        &self.windows
    }

    /// 为一次请求计数并判断是否放行
    ///
    /// 同一客户端的所有窗口在分片写锁内一次性更新，不同客户端互不阻塞。
    pub fn admit(&self, identity: &str) -> Admission {
        let now = self.clock.now();
        let mut entry = self
            .clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientState {
                counters: self
                    .windows
                    .iter()
                    .map(|_| WindowCounter {
                        started_at: now,
                        count: 0,
                    })
                    .collect(),
                last_seen: now,
            });
        let state = entry.value_mut();
        state.last_seen = now;

        let mut rejection = None;
        for (index, (window, counter)) in self.windows.iter().zip(state.counters.iter_mut()).enumerate()
        {
            let elapsed = elapsed_between(counter.started_at, now);
            if elapsed >= window.duration {
                counter.started_at = now;
                counter.count = 0;
            }

            counter.count = counter.count.saturating_add(1);

            if counter.count > window.max_count && rejection.is_none() {
                let elapsed = elapsed_between(counter.started_at, now);
                rejection = Some(Rejection {
                    window_index: index,
                    window: window.clone(),
                    retry_after: window.duration.saturating_sub(elapsed),
                });
            }
        }

        match rejection {
            Some(rejection) => Admission::Rejected(rejection),
            None => Admission::Admitted,
        }
    }

    /// 当前各窗口计数（窗口已过期的按 0 计）
    pub fn counts(&self, identity: &str) -> Option<Vec<u64>> {
        let now = self.clock.now();
        self.clients.get(identity).map(|state| {
            self.windows
                .iter()
                .zip(state.counters.iter())
                .map(|(window, counter)| {
                    if elapsed_between(counter.started_at, now) >= window.duration {
                        0
                    } else {
                        counter.count
                    }
                })
                .collect()
        })
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// 清理空闲时间超过最长窗口的客户端，返回清理数量
    pub fn evict_idle(&self) -> usize {
        let Some(longest) = self.windows.iter().map(|w| w.duration).max() else {
            return 0;
        };

        let now = self.clock.now();
        let before = self.clients.len();
        self.clients
            .retain(|_, state| elapsed_between(state.last_seen, now) <= longest);
        let evicted = before.saturating_sub(self.clients.len());

        if evicted > 0 {
            debug!("Rate limiter evicted {} idle clients", evicted);
        }
        evicted
    }
}
