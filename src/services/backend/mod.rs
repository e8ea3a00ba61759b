//! 天气数据后端
//!
//! - `wwo`：WorldWeatherOnline，需要 API key（主后端）
//! - `metno`：met.no locationforecast，免费（备用后端）
//!
//! 使用哪个后端在启动时由凭据决定，运行期间不切换。

mod metno;
mod selector;
mod wwo;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::errors::Result;
use crate::services::geoip::Location;

pub use metno::MetNoBackend;
pub use selector::{BackendSelector, Payload};
pub use wwo::WwoBackend;

const DEFAULT_LANG: &str = "en";
const MAX_DAYS: u8 = 3;

/// 进程生命周期内固定的后端模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Primary,
    Fallback,
}

/// 请求天气的位置：坐标或客户端提供的地名
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherLocation {
    Coordinates { latitude: f64, longitude: f64 },
    Name(String),
}

impl WeatherLocation {
    /// 解析 `lat,lon` 或地名；空白返回 None
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some((lat, lon)) = text.split_once(',')
            && let (Ok(latitude), Ok(longitude)) =
                (lat.trim().parse::<f64>(), lon.trim().parse::<f64>())
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
        {
            return Some(Self::Coordinates {
                latitude,
                longitude,
            });
        }

        Some(Self::Name(text.to_string()))
    }

    pub fn coordinates(latitude: f64, longitude: f64) -> Self {
        Self::Coordinates {
            latitude,
            longitude,
        }
    }

    /// 缓存 key 形式：坐标保留 4 位小数，地名小写
    pub fn cache_key(&self) -> String {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => format!("{:.4},{:.4}", latitude, longitude),
            Self::Name(name) => name.to_lowercase(),
        }
    }
}

impl From<&Location> for WeatherLocation {
    fn from(location: &Location) -> Self {
        Self::coordinates(location.latitude, location.longitude)
    }
}

impl fmt::Display for WeatherLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => write!(f, "{:.4},{:.4}", latitude, longitude),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// 决定上游响应内容的查询参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    pub lang: String,
    pub days: u8,
}

impl Default for WeatherQuery {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.to_string(),
            days: MAX_DAYS,
        }
    }
}

impl WeatherQuery {
    /// 规范化参数：非法语言回退为 `en`，天数限制在 1..=3
    pub fn new(lang: Option<&str>, days: Option<u8>) -> Self {
        let lang = lang
            .map(|l| l.trim().to_lowercase())
            .filter(|l| {
                !l.is_empty()
                    && l.len() <= 8
                    && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
            .unwrap_or_else(|| DEFAULT_LANG.to_string());
        let days = days.unwrap_or(MAX_DAYS).clamp(1, MAX_DAYS);
        Self { lang, days }
    }

    pub fn cache_key(&self) -> String {
        format!("lang={}&days={}", self.lang, self.days)
    }
}

/// 天气数据后端
#[async_trait]
pub trait WeatherBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// 是否能直接按地名查询（否则地名必须先解析为坐标）
    fn accepts_place_names(&self) -> bool {
        false
    }

    /// 单次上游请求，不重试
    async fn fetch(&self, location: &WeatherLocation, query: &WeatherQuery) -> Result<Bytes>;
}
