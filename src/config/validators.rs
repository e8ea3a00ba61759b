//! 配置校验
//!
//! 返回全部问题的列表，启动时一次性报告。

use std::collections::HashSet;
use std::str::FromStr;

use super::AppConfig;
use crate::services::geoip::ProviderKind;
use crate::utils::ip::IpNetwork;

pub fn validate_config(config: &AppConfig) -> Vec<String> {
    let mut problems = Vec::new();

    validate_windows(config, &mut problems);
    validate_geoip(config, &mut problems);

    for proxy in &config.server.trusted_proxies {
        if proxy.parse::<IpNetwork>().is_err() {
            problems.push(format!(
                "server.trusted_proxies contains invalid entry '{}'",
                proxy
            ));
        }
    }

    if config.upstream.timeout_ms == 0 {
        problems.push("upstream.timeout_ms must be greater than 0".to_string());
    }
    if config.cache.sweep_interval_secs == 0 {
        problems.push("cache.sweep_interval_secs must be greater than 0".to_string());
    }
    if config.cache.lru_max_bytes == 0 {
        problems.push("cache.lru_max_bytes must be greater than 0".to_string());
    }
    if !matches!(config.logging.format.as_str(), "text" | "json") {
        problems.push(format!(
            "logging.format must be 'text' or 'json', got '{}'",
            config.logging.format
        ));
    }

    problems
}

fn validate_windows(config: &AppConfig, problems: &mut Vec<String>) {
    let windows = &config.rate_limit.windows;
    if windows.is_empty() {
        problems.push("rate_limit.windows must contain at least one window".to_string());
    }

    let mut names = HashSet::new();
    for window in windows {
        if window.duration_secs == 0 {
            problems.push(format!(
                "rate_limit window '{}' has zero duration",
                window.name
            ));
        }
        if window.max_queries == 0 {
            problems.push(format!(
                "rate_limit window '{}' has zero max_queries",
                window.name
            ));
        }
        if !names.insert(window.name.as_str()) {
            problems.push(format!("rate_limit window '{}' is duplicated", window.name));
        }
    }
}

fn validate_geoip(config: &AppConfig, problems: &mut Vec<String>) {
    let geoip = &config.geoip;

    if geoip.order.is_empty() {
        problems.push("geoip.order must name at least one provider".to_string());
    }

    let mut seen = HashSet::new();
    for name in &geoip.order {
        match ProviderKind::from_str(name) {
            Ok(kind) => {
                if !seen.insert(kind) {
                    problems.push(format!("geoip.order lists '{}' twice", name));
                }
            }
            Err(_) => problems.push(format!(
                "geoip.order contains unknown provider '{}'. Valid: geoip, ip2location, ipinfo",
                name
            )),
        }
    }

    if geoip.timeout_ms == 0 {
        problems.push("geoip.timeout_ms must be greater than 0".to_string());
    }
    if geoip.location_ttl_secs == 0 {
        problems.push("geoip.location_ttl_secs must be greater than 0".to_string());
    }

    let geolocator = geoip.geolocator_url.trim();
    if !geolocator.is_empty() && !geolocator.starts_with("http://") && !geolocator.starts_with("https://") {
        problems.push(format!(
            "geoip.geolocator_url '{}' must be an http(s) URL or empty",
            geolocator
        ));
    }

    let default = &geoip.default_location;
    if !(-90.0..=90.0).contains(&default.latitude) || !(-180.0..=180.0).contains(&default.longitude)
    {
        problems.push(format!(
            "geoip.default_location '{}' has out-of-range coordinates",
            default.name
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_empty());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = AppConfig::default();
        config.geoip.order = vec!["geoip".into(), "maxmind".into(), "geoip".into()];

        let problems = validate_config(&config);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("maxmind"));
        assert!(problems[1].contains("twice"));
    }

    #[test]
    fn test_geolocator_url_must_be_http() {
        let mut config = AppConfig::default();
        config.geoip.geolocator_url = "localhost:8004".into();
        assert_eq!(validate_config(&config).len(), 1);

        config.geoip.geolocator_url = String::new();
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.windows = vec![WindowConfig {
            name: "burst".into(),
            duration_secs: 0,
            max_queries: 0,
        }];

        let problems = validate_config(&config);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_bad_log_format_is_rejected() {
        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn test_invalid_trusted_proxy_is_rejected() {
        let mut config = AppConfig::default();
        config.server.trusted_proxies = vec!["10.0.0.0/8".into(), "10.0.0.0/40".into()];

        let problems = validate_config(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("10.0.0.0/40"));
    }
}
