//! WorldWeatherOnline 后端

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ureq::Agent;

use super::{WeatherBackend, WeatherLocation, WeatherQuery};
use crate::config::Secret;
use crate::errors::{Result, WttrError};
use crate::services::http::{build_agent, fetch_bytes};
use crate::utils::redact_secret;

pub struct WwoBackend {
    agent: Agent,
    base_url: String,
    key: Secret,
    user_agent: String,
}

impl WwoBackend {
    pub fn new(
        base_url: impl Into<String>,
        key: Secret,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: base_url.into(),
            key,
            user_agent: user_agent.into(),
        }
    }

    fn request_url(&self, location: &WeatherLocation, query: &WeatherQuery) -> String {
        format!(
            "{}?key={}&q={}&format=json&num_of_days={}&tp=3&lang={}",
            self.base_url,
            urlencoding::encode(self.key.expose()),
            urlencoding::encode(&location.to_string()),
            query.days,
            urlencoding::encode(&query.lang),
        )
    }
}

#[async_trait]
impl WeatherBackend for WwoBackend {
    fn name(&self) -> &'static str {
        "wwo"
    }

    fn accepts_place_names(&self) -> bool {
        true
    }

    async fn fetch(&self, location: &WeatherLocation, query: &WeatherQuery) -> Result<Bytes> {
        let url = self.request_url(location, query);
        fetch_bytes(&self.agent, url, Some(self.user_agent.clone()))
            .await
            .map_err(|e| {
                WttrError::backend_unavailable(redact_secret(
                    &format!("wwo: {}", e),
                    Some(self.key.expose()),
                ))
            })
    }
}
