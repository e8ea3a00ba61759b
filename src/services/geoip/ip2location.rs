//! IP2Location.io 远程查询

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::trace;
use ureq::Agent;

use super::provider::{Location, LocationProvider, ProviderError};
use super::{map_fetch_error, render_url};
use crate::config::Secret;
use crate::services::http::{build_agent, fetch_bytes};

#[derive(Debug, Deserialize)]
struct Ip2LocationResponse {
    country_code: Option<String>,
    region_name: Option<String>,
    city_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    error: Option<serde_json::Value>,
}

pub struct Ip2LocationProvider {
    agent: Agent,
    url_template: String,
    key: Option<Secret>,
    user_agent: String,
}

impl Ip2LocationProvider {
    pub fn new(
        url_template: impl Into<String>,
        key: Option<Secret>,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            url_template: url_template.into(),
            key,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl LocationProvider for Ip2LocationProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let Some(key) = self.key.as_ref() else {
            return Err(ProviderError::NoCredential);
        };

        let url = render_url(&self.url_template, ip, key);
        let body = fetch_bytes(&self.agent, url, Some(self.user_agent.clone()))
            .await
            .map_err(|e| map_fetch_error(e, key))?;

        let response: Ip2LocationResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(ProviderError::Unavailable(format!("api error: {}", error)));
        }

        let (Some(latitude), Some(longitude)) = (response.latitude, response.longitude) else {
            return Err(ProviderError::NotFound);
        };

        trace!("IP2Location lookup for {}: {:?}", ip, response.city_name);
        Ok(Location {
            latitude,
            longitude,
            city: response.city_name.filter(|c| !c.is_empty() && c != "-"),
            region: response.region_name.filter(|r| !r.is_empty() && r != "-"),
            country_code: response.country_code.filter(|c| !c.is_empty() && c != "-"),
            source: self.name().to_string(),
            resolved_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "ip2location"
    }
}
