//! MaxMind GeoLite2 数据库实现
//!
//! 使用本地 MaxMind GeoLite2-City.mmdb 文件进行 IP 地理位置查询。
//! 数据库缺失或无法加载时 provider 保持不可用状态（解析时被跳过），不阻止启动。

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use maxminddb::Reader;
use tracing::{info, trace, warn};

use super::provider::{Location, LocationProvider, ProviderError};

pub struct MaxMindProvider {
    path: PathBuf,
    reader: Option<Arc<Reader<Vec<u8>>>>,
}

impl MaxMindProvider {
    /// 打开数据库文件，失败时记录警告并返回不可用的 provider
    pub fn open(path: &Path) -> Self {
        let reader = if path.exists() {
            match Reader::open_readfile(path) {
                Ok(reader) => {
                    info!("GeoIP: Using MaxMind database at {}", path.display());
                    Some(Arc::new(reader))
                }
                Err(e) => {
                    warn!(
                        "GeoIP: Failed to load MaxMind database at {}: {}",
                        path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            warn!("GeoIP: MaxMind database {} not found", path.display());
            None
        };

        Self {
            path: path.to_path_buf(),
            reader,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.reader.is_some()
    }
}

#[async_trait]
impl LocationProvider for MaxMindProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let Some(reader) = self.reader.as_ref() else {
            return Err(ProviderError::NotConfigured(format!(
                "database {} not loaded",
                self.path.display()
            )));
        };

        let result = reader
            .lookup(ip)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let city: maxminddb::geoip2::City = result
            .decode()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .ok_or(ProviderError::NotFound)?;

        let (Some(latitude), Some(longitude)) = (city.location.latitude, city.location.longitude)
        else {
            return Err(ProviderError::NotFound);
        };

        let location = Location {
            latitude,
            longitude,
            city: city.city.names.english.map(String::from),
            region: city
                .subdivisions
                .first()
                .and_then(|s| s.names.english)
                .map(String::from),
            country_code: city.country.iso_code.map(String::from),
            source: self.name().to_string(),
            resolved_at: Utc::now(),
        };

        trace!(
            "MaxMind lookup for {}: country={:?}, city={:?}",
            ip, location.country_code, location.city
        );
        Ok(location)
    }

    fn name(&self) -> &'static str {
        "geoip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_database_is_skipped() {
        let dir = TempDir::new().unwrap();
        let provider = MaxMindProvider::open(&dir.path().join("GeoLite2-City.mmdb"));
        assert!(!provider.is_loaded());

        let err = provider
            .resolve("198.51.100.9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_skip());
    }

    #[tokio::test]
    async fn test_corrupt_database_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("GeoLite2-City.mmdb");
        std::fs::write(&path, b"definitely not an mmdb file").unwrap();

        let provider = MaxMindProvider::open(&path);
        assert!(!provider.is_loaded());
    }
}
