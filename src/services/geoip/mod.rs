//! GeoIP 服务模块
//!
//! 提供 IP 地址地理位置查询功能，支持：
//! - MaxMind GeoLite2 本地数据库 (`geoip`)
//! - IP2Location.io (`ip2location`)
//! - ipinfo.io (`ipinfo`)
//!
//! 以及地名 → 坐标的 geolocator 服务。

mod geocoder;
mod ip2location;
mod ipinfo;
mod maxmind;
mod provider;
mod resolver;

use std::net::IpAddr;

pub use geocoder::{GeolocatorService, PlaceGeocoder};
pub use ip2location::Ip2LocationProvider;
pub use ipinfo::IpInfoProvider;
pub use maxmind::MaxMindProvider;
pub use provider::{Location, LocationProvider, ProviderError, ProviderKind};
pub use resolver::{
    AttemptOutcome, GeoResolver, PlaceResolution, ProviderAttempt, Resolution, ResolvedLocation,
};

use crate::config::Secret;
use crate::services::http::FetchError;
use crate::utils::redact_secret;

/// 填充 URL 模板中的 `{ip}` 与 `{key}`
fn render_url(template: &str, ip: IpAddr, key: &Secret) -> String {
    template
        .replace("{ip}", &ip.to_string())
        .replace("{key}", &urlencoding::encode(key.expose()))
}

/// 出站错误转换为 provider 失败，错误文本中不保留密钥
fn map_fetch_error(err: FetchError, key: &Secret) -> ProviderError {
    match err {
        FetchError::Timeout => ProviderError::Timeout,
        FetchError::Status(404) => ProviderError::NotFound,
        other => ProviderError::Unavailable(redact_secret(&other.to_string(), Some(key.expose()))),
    }
}
