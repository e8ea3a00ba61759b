//! met.no locationforecast 后端（无需 key，只接受坐标）

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ureq::Agent;

use super::{WeatherBackend, WeatherLocation, WeatherQuery};
use crate::errors::{Result, WttrError};
use crate::services::http::{build_agent, fetch_bytes};

pub struct MetNoBackend {
    agent: Agent,
    base_url: String,
    user_agent: String,
}

impl MetNoBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: base_url.into(),
            user_agent: user_agent.into(),
        }
    }

    fn request_url(&self, latitude: f64, longitude: f64) -> String {
        // met.no 要求坐标最多 4 位小数
        format!("{}?lat={:.4}&lon={:.4}", self.base_url, latitude, longitude)
    }
}

#[async_trait]
impl WeatherBackend for MetNoBackend {
    fn name(&self) -> &'static str {
        "metno"
    }

    async fn fetch(&self, location: &WeatherLocation, _query: &WeatherQuery) -> Result<Bytes> {
        let WeatherLocation::Coordinates {
            latitude,
            longitude,
        } = location
        else {
            return Err(WttrError::resolution_unavailable(format!(
                "metno needs coordinates, got place name '{}'",
                location
            )));
        };

        let url = self.request_url(*latitude, *longitude);
        fetch_bytes(&self.agent, url, Some(self.user_agent.clone()))
            .await
            .map_err(|e| WttrError::backend_unavailable(format!("metno: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MetNoBackend {
        MetNoBackend::new("http://127.0.0.1:9/compact", Duration::from_secs(1), "test")
    }

    #[test]
    fn test_request_url_rounds_coordinates() {
        assert_eq!(
            backend().request_url(63.460_812, 142.785_81),
            "http://127.0.0.1:9/compact?lat=63.4608&lon=142.7858"
        );
    }

    #[tokio::test]
    async fn test_place_name_is_rejected_without_request() {
        let err = backend()
            .fetch(&WeatherLocation::Name("Paris".into()), &WeatherQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WttrError::ResolutionUnavailable(_)));
        assert!(!backend().accepts_place_names());
    }
}
