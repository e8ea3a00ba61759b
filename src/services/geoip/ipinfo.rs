//! ipinfo.io 远程查询

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
struct IpInfoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    /// "lat,lon"
    loc: Option<String>,
    #[serde(default)]
    bogon: bool,
}

/// 解析 ipinfo 的 `loc` 字段
fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

pub struct IpInfoProvider {
    agent: Agent,
    url_template: String,
    key: Option<Secret>,
    user_agent: String,
}

impl IpInfoProvider {
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
impl LocationProvider for IpInfoProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let Some(key) = self.key.as_ref() else {
            return Err(ProviderError::NoCredential);
        };

        let url = render_url(&self.url_template, ip, key);
        let body = fetch_bytes(&self.agent, url, Some(self.user_agent.clone()))
            .await
            .map_err(|e| map_fetch_error(e, key))?;

        let response: IpInfoResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if response.bogon {
            return Err(ProviderError::NotFound);
        }

        let (latitude, longitude) = match response.loc.as_deref() {
            Some(loc) => parse_loc(loc)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("bad loc field: {}", loc)))?,
            None => return Err(ProviderError::NotFound),
        };

        trace!("ipinfo lookup for {}: {:?}", ip, response.city);
        Ok(Location {
            latitude,
            longitude,
            city: response.city.filter(|c| !c.is_empty()),
            region: response.region.filter(|r| !r.is_empty()),
            country_code: response.country.filter(|c| !c.is_empty()),
            source: self.name().to_string(),
            resolved_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "ipinfo"
    }
}
