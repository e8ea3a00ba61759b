use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

/// 缓存用途（命名空间）
///
/// 每个用途对应缓存根目录下的独立子目录，淘汰与容量统计互不影响。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CachePurpose {
    /// IP → Location
    Location,
    /// 渲染后的图片
    Image,
    /// 通用 LRU 缓存
    Lru,
    /// 上游天气接口响应
    Proxy,
}

/// 淘汰策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Ttl,
    LeastRecentlyUsed,
}

impl CachePurpose {
    /// 缓存根目录下的子目录名
    pub fn dir_name(self) -> &'static str {
        match self {
            CachePurpose::Location => "ip2l",
            CachePurpose::Image => "png",
            CachePurpose::Lru => "lru",
            CachePurpose::Proxy => "proxy-wwo",
        }
    }

    pub fn eviction_policy(self) -> EvictionPolicy {
        match self {
            CachePurpose::Lru => EvictionPolicy::LeastRecentlyUsed,
            _ => EvictionPolicy::Ttl,
        }
    }
}
