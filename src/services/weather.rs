//! 单次天气请求的处理流程
//!
//! 黑名单 → 限流 → 定位（或使用请求中的位置 / 默认位置）→ 后端取数（proxy 缓存优先）。
//! 请求中的位置先做别名替换；地名经 geolocator 解析为坐标，不存在的地名直接返回 404，
//! 不到达后端。所有拒绝与失败都经过 `RequestLog`。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::aliases::LocationAliases;
use super::backend::{BackendSelector, Payload, WeatherLocation, WeatherQuery};
use super::blacklist::Blacklist;
use super::geoip::{GeoResolver, PlaceResolution, Resolution};
use super::rate_limit::{Admission, RateLimiter};
use super::request_log::{AccessOutcome, RequestLog};
use crate::config::DefaultLocationConfig;
use crate::errors::{Result, WttrError};
use crate::utils::ip::parse_ip;

/// 客户端身份（通常是 IP 的规范形式）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct WeatherRequest {
    pub identity: ClientIdentity,
    /// 客户端指定的位置（坐标、地名或 IP），为空时按客户端 IP 定位
    pub location: Option<String>,
    pub query: WeatherQuery,
}

#[derive(Debug, Clone)]
pub struct WeatherResponse {
    /// 实际使用的位置名称
    pub place: String,
    /// 位置来源：provider 名称、`geolocator`、`requested` 或 `default`
    pub location_source: String,
    pub payload: Payload,
}

type Target = (WeatherLocation, String, String);

pub struct WeatherService {
    blacklist: Arc<Blacklist>,
    aliases: Arc<LocationAliases>,
    limiter: Arc<RateLimiter>,
    resolver: Arc<GeoResolver>,
    backends: Arc<BackendSelector>,
    log: Arc<RequestLog>,
    default_location: DefaultLocationConfig,
}

impl WeatherService {
    pub fn new(
        blacklist: Arc<Blacklist>,
        aliases: Arc<LocationAliases>,
        limiter: Arc<RateLimiter>,
        resolver: Arc<GeoResolver>,
        backends: Arc<BackendSelector>,
        log: Arc<RequestLog>,
        default_location: DefaultLocationConfig,
    ) -> Self {
        Self {
            blacklist,
            aliases,
            limiter,
            resolver,
            backends,
            log,
            default_location,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }

    pub fn backends(&self) -> &BackendSelector {
        &self.backends
    }

    pub async fn handle(&self, request: WeatherRequest) -> Result<WeatherResponse> {
        let identity = request.identity.as_str();
        let requested = request
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let aliased = requested.map(|l| self.aliases.resolve(l));

        if self.blacklist.is_blocked(identity)
            || requested.is_some_and(|l| self.blacklist.is_blocked(l))
            || aliased.is_some_and(|l| self.blacklist.is_blocked(l))
        {
            self.log.access(identity, &AccessOutcome::Blocked);
            return Err(WttrError::blocked(format!(
                "request from {} is blacklisted",
                identity
            )));
        }

        if let Admission::Rejected(rejection) = self.limiter.admit(identity) {
            self.log.rate_limited(identity, &rejection);
            self.log.access(
                identity,
                &AccessOutcome::RateLimited {
                    window: rejection.window.name.clone(),
                },
            );
            return Err(WttrError::rate_limited(
                format!("Too many queries ({} window)", rejection.window.name),
                rejection.retry_after,
            ));
        }

        let (target, place, location_source) = match (requested, aliased) {
            (Some(text), Some(aliased)) => self.requested_target(identity, text, aliased).await?,
            _ => self.locate(identity).await,
        };

        match self.backends.fetch(&target, &request.query).await {
            Ok(payload) => {
                self.log.access(
                    identity,
                    &AccessOutcome::Served {
                        location: place.clone(),
                        backend: payload.backend,
                        cached: payload.cached,
                    },
                );
                Ok(WeatherResponse {
                    place,
                    location_source,
                    payload,
                })
            }
            Err(e) => {
                self.log
                    .error(&format!("Weather fetch for {} failed: {}", place, e));
                self.log
                    .access(identity, &AccessOutcome::Failed { code: e.code() });
                Err(e)
            }
        }
    }

    async fn requested_target(&self, identity: &str, text: &str, aliased: &str) -> Result<Target> {
        // 请求中的 IP 与客户端 IP 走同一条定位链
        if parse_ip(aliased).is_some() {
            return Ok(self.locate(aliased).await);
        }

        match WeatherLocation::parse(aliased) {
            Some(WeatherLocation::Name(name)) => self.geocode(identity, text, name).await,
            Some(target) => {
                let place = target.to_string();
                Ok((target, place, "requested".to_string()))
            }
            None => Ok(self.default_target()),
        }
    }

    /// 地名 → 坐标
    ///
    /// geolocator 不可用时，能直接按地名查询的后端照常使用地名；
    /// 只接受坐标的后端返回 503，只记警告不告警。
    async fn geocode(&self, identity: &str, text: &str, name: String) -> Result<Target> {
        match self.resolver.resolve_place(&name).await {
            PlaceResolution::Found(location) => Ok((
                WeatherLocation::from(&location),
                text.to_string(),
                location.source,
            )),
            PlaceResolution::NotFound => Err(self.place_not_found(identity, text)),
            PlaceResolution::Unavailable(e) if self.backends.accepts_place_names() => {
                debug!("Geocoding '{}' unavailable ({}), passing the name through", name, e);
                Ok((WeatherLocation::Name(name), text.to_string(), "requested".to_string()))
            }
            // 没有 geolocator 时地名永远无法解析
            PlaceResolution::Unavailable(e) if e.is_skip() => Err(self.place_not_found(identity, text)),
            PlaceResolution::Unavailable(e) => {
                warn!("Cannot geocode '{}' for {}: {}", name, identity, e);
                let err = WttrError::resolution_unavailable(format!(
                    "cannot resolve '{}' right now: {}",
                    name, e
                ));
                self.log
                    .access(identity, &AccessOutcome::Failed { code: err.code() });
                Err(err)
            }
        }
    }

    fn place_not_found(&self, identity: &str, text: &str) -> WttrError {
        debug!("Unknown location '{}' requested by {}", text, identity);
        self.log.access(
            identity,
            &AccessOutcome::NotFound {
                location: text.to_string(),
            },
        );
        WttrError::location_not_found(text)
    }

    async fn locate(&self, identity: &str) -> Target {
        let resolved = self.resolver.resolve(identity).await;
        match resolved.resolution {
            Resolution::Found(location) => (
                WeatherLocation::from(&location),
                location.display_name(),
                location.source,
            ),
            Resolution::Unknown => {
                debug!(
                    "Location of {} unknown after {} attempts, using default",
                    identity,
                    resolved.attempts.len()
                );
                self.default_target()
            }
        }
    }

    fn default_target(&self) -> Target {
        (
            WeatherLocation::coordinates(
                self.default_location.latitude,
                self.default_location.longitude,
            ),
            self.default_location.name.clone(),
            "default".to_string(),
        )
    }
}
