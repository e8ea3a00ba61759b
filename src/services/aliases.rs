//! 位置别名
//!
//! 启动时从文本文件加载，每行 `别名: 目标位置`，`#` 开头为注释。
//! 别名不区分大小写；目标可以是地名、坐标或 IP。
//! 文件不存在时不使用别名。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::errors::{Result, WttrError};

#[derive(Debug, Default, Clone)]
pub struct LocationAliases {
    aliases: HashMap<String, String>,
}

impl LocationAliases {
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No location aliases at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(WttrError::configuration(format!(
                    "Cannot load location aliases {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let aliases = Self::parse(&content);
        info!(
            "Location aliases loaded from {}: {} entries",
            path.display(),
            aliases.len()
        );
        Ok(aliases)
    }

    pub fn parse(content: &str) -> Self {
        let mut aliases = HashMap::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once(':') {
                Some((alias, target)) if !alias.trim().is_empty() && !target.trim().is_empty() => {
                    aliases.insert(alias.trim().to_lowercase(), target.trim().to_string());
                }
                _ => warn!("Ignoring malformed alias on line {}: {}", number + 1, line),
            }
        }
        Self { aliases }
    }

    /// 别名对应的目标；没有别名时原样返回
    pub fn resolve<'a>(&'a self, location: &'a str) -> &'a str {
        self.aliases
            .get(&location.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(location)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
