use std::fmt;

/// 请求处理与启动阶段的统一错误类型
///
/// 只有 `Configuration` 会中止进程启动；其余错误都只影响当前请求。
#[derive(Debug, Clone)]
pub enum WttrError {
    Blocked(String),
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },
    ResolutionUnavailable(String),
    BackendUnavailable(String),
    Configuration(String),
    FileOperation(String),
    Serialization(String),
    LocationNotFound(String),
}

impl WttrError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            WttrError::Blocked(_) => "E001",
            WttrError::RateLimited { .. } => "E002",
            WttrError::ResolutionUnavailable(_) => "E003",
            WttrError::BackendUnavailable(_) => "E004",
            WttrError::Configuration(_) => "E005",
            WttrError::FileOperation(_) => "E006",
            WttrError::Serialization(_) => "E007",
            WttrError::LocationNotFound(_) => "E008",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            WttrError::Blocked(_) => "Blocked",
            WttrError::RateLimited { .. } => "Rate Limited",
            WttrError::ResolutionUnavailable(_) => "Resolution Unavailable",
            WttrError::BackendUnavailable(_) => "Backend Unavailable",
            WttrError::Configuration(_) => "Configuration Error",
            WttrError::FileOperation(_) => "File Operation Error",
            WttrError::Serialization(_) => "Serialization Error",
            WttrError::LocationNotFound(_) => "Location Not Found",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            WttrError::Blocked(msg) => msg,
            WttrError::RateLimited { message, .. } => message,
            WttrError::ResolutionUnavailable(msg) => msg,
            WttrError::BackendUnavailable(msg) => msg,
            WttrError::Configuration(msg) => msg,
            WttrError::FileOperation(msg) => msg,
            WttrError::Serialization(msg) => msg,
            WttrError::LocationNotFound(msg) => msg,
        }
    }

    /// 限流错误携带的重试等待秒数
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            WttrError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// 是否为启动期致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, WttrError::Configuration(_))
    }

    /// 格式化为彩色输出（用于启动失败时的终端提示）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for WttrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for WttrError {}

// 便捷的构造函数
impl WttrError {
    pub fn blocked<T: Into<String>>(msg: T) -> Self {
        WttrError::Blocked(msg.into())
    }

    pub fn rate_limited<T: Into<String>>(msg: T, retry_after: std::time::Duration) -> Self {
        // 不足一秒按一秒计
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        WttrError::RateLimited {
            message: msg.into(),
            retry_after_secs: secs,
        }
    }

    pub fn resolution_unavailable<T: Into<String>>(msg: T) -> Self {
        WttrError::ResolutionUnavailable(msg.into())
    }

    pub fn location_not_found<T: Into<String>>(msg: T) -> Self {
        WttrError::LocationNotFound(msg.into())
    }

    pub fn backend_unavailable<T: Into<String>>(msg: T) -> Self {
        WttrError::BackendUnavailable(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        WttrError::Configuration(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        WttrError::FileOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        WttrError::Serialization(msg.into())
    }
}

impl From<std::io::Error> for WttrError {
    fn from(err: std::io::Error) -> Self {
        WttrError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for WttrError {
    fn from(err: serde_json::Error) -> Self {
        WttrError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for WttrError {
    fn from(err: config::ConfigError) -> Self {
        WttrError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WttrError>;
