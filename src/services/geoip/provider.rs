//! GeoIP Provider 抽象层
//!
//! 每个 provider 只负责一件事：把 IP 解析为 Location，或说明失败原因。
//! provider 之间的顺序、超时、缓存由 `GeoResolver` 负责。

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// 地理位置解析结果（创建后不可变，过期后整体替换）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub region: Option<String>,
    /// ISO 3166-1 alpha-2 国家代码 (e.g., "CN", "US")
    pub country_code: Option<String>,
    /// 产生该结果的 provider 名称，默认位置为 "default"
    pub source: String,
    pub resolved_at: DateTime<Utc>,
}

impl Location {
    /// 便于展示的名称：城市名，否则坐标
    pub fn display_name(&self) -> String {
        match &self.city {
            Some(city) if !city.is_empty() => city.clone(),
            _ => format!("{:.4},{:.4}", self.latitude, self.longitude),
        }
    }
}

/// 内置 provider 类型（用于配置中的顺序列表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
pub enum ProviderKind {
    #[strum(serialize = "geoip")]
    MaxMind,
    #[strum(serialize = "ip2location")]
    Ip2Location,
    #[strum(serialize = "ipinfo")]
    IpInfo,
}

/// provider 失败原因
///
/// `NoCredential` 与 `NotConfigured` 表示 provider 不可用（跳过），
/// 其余表示尝试过但失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    NoCredential,
    NotConfigured(String),
    NotFound,
    Unavailable(String),
    InvalidResponse(String),
    Timeout,
}

impl ProviderError {
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ProviderError::NoCredential | ProviderError::NotConfigured(_)
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NoCredential => write!(f, "no credential configured"),
            ProviderError::NotConfigured(what) => write!(f, "not configured: {}", what),
            ProviderError::NotFound => write!(f, "not found"),
            ProviderError::Unavailable(why) => write!(f, "remote unavailable: {}", why),
            ProviderError::InvalidResponse(why) => write!(f, "invalid response: {}", why),
            ProviderError::Timeout => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// GeoIP 查询 trait
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// 查询 IP 地址的地理位置
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ProviderError>;

    /// 获取 provider 名称（用于日志与诊断）
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(ProviderKind::from_str("geoip").unwrap(), ProviderKind::MaxMind);
        assert_eq!(
            ProviderKind::from_str("ip2location").unwrap(),
            ProviderKind::Ip2Location
        );
        assert_eq!(ProviderKind::IpInfo.to_string(), "ipinfo");
        assert!(ProviderKind::from_str("maxmind").is_err());
    }

    #[test]
    fn test_skip_classification() {
        assert!(ProviderError::NoCredential.is_skip());
        assert!(ProviderError::NotConfigured("db".into()).is_skip());
        assert!(!ProviderError::Timeout.is_skip());
        assert!(!ProviderError::NotFound.is_skip());
    }

    #[test]
    fn test_display_name_falls_back_to_coordinates() {
        let location = Location {
            latitude: 48.8566,
            longitude: 2.3522,
            city: None,
            region: None,
            country_code: Some("FR".into()),
            source: "test".into(),
            resolved_at: Utc::now(),
        };
        assert_eq!(location.display_name(), "48.8566,2.3522");
    }
}
