//! 地名 → 坐标
//!
//! 请求中的地名（城市、地址、机场等）交给本地 geolocator 服务解析。
//! 服务约定：`GET {base_url}/{urlencoded name}`，返回
//! `{"address": ..., "latitude": ..., "longitude": ...}`，未知地名返回 404 或缺少坐标。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::trace;
use ureq::Agent;

use super::provider::{Location, ProviderError};
use crate::services::http::{FetchError, build_agent, fetch_bytes};

/// 地名解析 trait
#[async_trait]
pub trait PlaceGeocoder: Send + Sync {
    async fn locate(&self, place: &str) -> Result<Location, ProviderError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct GeolocatorResponse {
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct GeolocatorService {
    agent: Agent,
    base_url: String,
    user_agent: String,
}

impl GeolocatorService {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    fn request_url(&self, place: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(place))
    }
}

fn parse_response(body: &[u8]) -> Result<Location, ProviderError> {
    let response: GeolocatorResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let (Some(latitude), Some(longitude)) = (response.latitude, response.longitude) else {
        return Err(ProviderError::NotFound);
    };
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(ProviderError::InvalidResponse(format!(
            "coordinates out of range: {},{}",
            latitude, longitude
        )));
    }

    Ok(Location {
        latitude,
        longitude,
        city: response.address.filter(|a| !a.is_empty()),
        region: None,
        country_code: None,
        source: "geolocator".to_string(),
        resolved_at: Utc::now(),
    })
}

#[async_trait]
impl PlaceGeocoder for GeolocatorService {
    async fn locate(&self, place: &str) -> Result<Location, ProviderError> {
        if self.base_url.is_empty() {
            return Err(ProviderError::NotConfigured("geolocator url".into()));
        }

        let body = fetch_bytes(&self.agent, self.request_url(place), Some(self.user_agent.clone()))
            .await
            .map_err(|e| match e {
                FetchError::Status(404) => ProviderError::NotFound,
                FetchError::Timeout => ProviderError::Timeout,
                other => ProviderError::Unavailable(other.to_string()),
            })?;

        let location = parse_response(&body)?;
        trace!("geolocator: {} -> {:?}", place, location.city);
        Ok(location)
    }

    fn name(&self) -> &'static str {
        "geolocator"
    }
}
