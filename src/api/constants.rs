//! API 模块常量定义

/// 实际使用的位置（URL 编码）
pub const HEADER_LOCATION: &str = "X-Location";

/// 提供数据的后端名称
pub const HEADER_BACKEND: &str = "X-Backend";

/// proxy 缓存状态：HIT / MISS
pub const HEADER_CACHE: &str = "X-Cache";

/// 限流拒绝时的响应体
pub const TOO_MANY_QUERIES: &str = "Too many queries";

/// 请求的地名不存在时的响应体
pub const LOCATION_NOT_FOUND: &str = "Location not found";

/// 无法解析客户端地址时使用的身份
pub const UNKNOWN_CLIENT: &str = "unknown";
