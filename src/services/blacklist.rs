//! 客户端黑名单
//!
//! 启动时从文本文件加载，运行期间只读。条目可以是：
//! - 单个 IP（按规范形式比较）
//! - CIDR 网段，如 `203.0.113.0/24`
//! - 其他标识（如 IATA 机场代码），不区分大小写

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use tracing::info;

use crate::errors::{Result, WttrError};
use crate::utils::ip::{IpNetwork, parse_ip};

#[derive(Debug, Default, Clone)]
pub struct Blacklist {
    addresses: HashSet<IpAddr>,
    networks: Vec<IpNetwork>,
    identifiers: HashSet<String>,
}

impl Blacklist {
    /// 从文件加载；文件缺失或无法读取时拒绝启动
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WttrError::configuration(format!(
                "Cannot load blacklist {}: {}",
                path.display(),
                e
            ))
        })?;

        let blacklist = Self::parse(&content);
        info!(
            "Blacklist loaded from {}: {} addresses, {} networks, {} identifiers",
            path.display(),
            blacklist.addresses.len(),
            blacklist.networks.len(),
            blacklist.identifiers.len()
        );
        Ok(blacklist)
    }

    pub fn parse(content: &str) -> Self {
        Self::from_entries(content.lines())
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blacklist = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            let entry = entry.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                continue;
            }

            if entry.contains('/')
                && let Ok(network) = entry.parse::<IpNetwork>()
            {
                blacklist.networks.push(network);
            } else if let Some(ip) = parse_ip(entry) {
                blacklist.addresses.insert(ip);
            } else {
                blacklist.identifiers.insert(entry.to_uppercase());
            }
        }
        blacklist
    }

    /// 仅内存查找，无 I/O
    pub fn is_blocked(&self, identity: &str) -> bool {
        let identity = identity.trim();
        if identity.is_empty() {
            return false;
        }

        match parse_ip(identity) {
            Some(ip) => {
                self.addresses.contains(&ip)
                    || self.networks.iter().any(|network| network.contains(&ip))
            }
            None => self.identifiers.contains(&identity.to_uppercase()),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len() + self.networks.len() + self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
