//! 出站 HTTP 请求（ureq）
//!
//! ureq 是同步客户端，在 `spawn_blocking` 中执行；每个 Agent 自带全局超时。

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use ureq::Agent;

/// 出站请求失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Status(u16),
    Timeout,
    Transport(String),
    Body(String),
    Join(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "upstream returned HTTP {}", code),
            FetchError::Timeout => write!(f, "upstream request timed out"),
            FetchError::Transport(msg) => write!(f, "transport error: {}", msg),
            FetchError::Body(msg) => write!(f, "failed to read response body: {}", msg),
            FetchError::Join(msg) => write!(f, "request task failed: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            ureq::Error::Timeout(_) => FetchError::Timeout,
            other => FetchError::Transport(other.to_string()),
        }
    }
}

/// 创建带全局超时的 Agent
pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(true)
        .build()
        .into()
}

/// GET 请求并读取完整响应体
pub async fn fetch_bytes(
    agent: &Agent,
    url: String,
    user_agent: Option<String>,
) -> Result<Bytes, FetchError> {
    let agent = agent.clone();
    tokio::task::spawn_blocking(move || {
        let mut request = agent.get(url.as_str());
        if let Some(ua) = user_agent.as_deref() {
            request = request.header("User-Agent", ua);
        }

        let response = request.call()?;
        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| FetchError::Body(e.to_string()))?;
        Ok(Bytes::from(body))
    })
    .await
    .map_err(|e| FetchError::Join(e.to_string()))?
}
