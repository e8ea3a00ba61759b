//! 凭据文件加载
//!
//! 每个凭据是一个纯文本文件，第一条非空行即密钥。
//! 文件不存在 → 凭据缺失（对应 provider / backend 不可用）；
//! 文件存在但无法读取 → 配置错误，拒绝启动。

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use super::CredentialFiles;
use crate::errors::{Result, WttrError};

/// 密钥字符串，Debug / Display 永远不输出明文
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// 启动时加载的全部凭据
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub ip2location: Option<Secret>,
    pub ipinfo: Option<Secret>,
    pub wwo: Option<Secret>,
}

impl Credentials {
    pub fn load(files: &CredentialFiles) -> Result<Self> {
        let credentials = Self {
            ip2location: read_optional(files.ip2location_key_file.as_deref(), "ip2location")?,
            ipinfo: read_optional(files.ipinfo_key_file.as_deref(), "ipinfo")?,
            wwo: read_optional(files.wwo_key_file.as_deref(), "wwo")?,
        };

        info!(
            "Credentials loaded: ip2location={}, ipinfo={}, wwo={}",
            credentials.ip2location.is_some(),
            credentials.ipinfo.is_some(),
            credentials.wwo.is_some()
        );
        Ok(credentials)
    }
}

fn read_optional(path: Option<&Path>, label: &str) -> Result<Option<Secret>> {
    match path {
        Some(path) => read_secret_file(path),
        None => {
            debug!("No key file configured for {}", label);
            Ok(None)
        }
    }
}

/// 读取单个凭据文件
pub fn read_secret_file(path: &Path) -> Result<Option<Secret>> {
    if !path.exists() {
        debug!("Key file {} not present", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        WttrError::configuration(format!(
            "Key file {} exists but cannot be read: {}",
            path.display(),
            e
        ))
    })?;

    match content.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(secret) => Ok(Some(Secret::new(secret))),
        None => {
            warn!("Key file {} is empty, treating as absent", path.display());
            Ok(None)
        }
    }
}
