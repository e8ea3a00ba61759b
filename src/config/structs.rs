use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WttrError};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 进程配置（启动时加载一次，之后只读）
///
/// 加载优先级：默认值 < TOML 文件 < `WTTR__SECTION__KEY` 环境变量 < 旧版 `WTTR_*` 环境变量
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub geoip: GeoIpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub credentials: CredentialFiles,
}

impl AppConfig {
    /// 从 TOML 文件和进程环境变量加载并校验配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, env)
    }

    /// 使用给定的环境变量表加载配置（测试时注入假环境）
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        use config::{Config, Environment, File};

        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let settings = Config::builder()
            .add_source(File::from(file.as_path()).required(required))
            .add_source(
                Environment::with_prefix("WTTR")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.apply_legacy_env(&env);
        config.validate()?;
        Ok(config)
    }

    /// 应用旧版扁平环境变量（WTTR_MYDIR、WTTR_LISTEN_PORT 等）
    pub fn apply_legacy_env(&mut self, env: &HashMap<String, String>) {
        let get = |key: &str| env.get(key).map(|v| v.trim().to_string());

        if let Some(dir) = get("WTTR_MYDIR").filter(|v| !v.is_empty()) {
            self.paths.root_dir = PathBuf::from(dir);
        }
        if let Some(geolite) = get("WTTR_GEOLITE").filter(|v| !v.is_empty()) {
            self.paths.geolite_db = Some(PathBuf::from(geolite));
        }
        if let Some(host) = get("WTTR_LISTEN_HOST") {
            self.server.host = if host.is_empty() {
                "0.0.0.0".to_string()
            } else {
                host
            };
        }
        // 无法解析的端口保持原值
        if let Some(port) = get("WTTR_LISTEN_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(user_agent) = get("WTTR_USER_AGENT") {
            self.upstream.user_agent = user_agent;
        }
        if let Some(order) = get("WTTR_IPLOCATION_ORDER").filter(|v| !v.is_empty()) {
            self.geoip.order = order
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let home = get("HOME").filter(|v| !v.is_empty()).map(PathBuf::from);
        let key_file = |var: &str, default_name: &str| -> Option<PathBuf> {
            get(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or_else(|| home.as_ref().map(|h| h.join(default_name)))
        };
        if self.credentials.ip2location_key_file.is_none() || env.contains_key("WTTR_IP2LOCATION_KEY_FILE") {
            self.credentials.ip2location_key_file =
                key_file("WTTR_IP2LOCATION_KEY_FILE", ".ip2location.key");
        }
        if self.credentials.ipinfo_key_file.is_none() || env.contains_key("WTTR_IPINFO_KEY_FILE") {
            self.credentials.ipinfo_key_file = key_file("WTTR_IPINFO_KEY_FILE", ".ipinfo.key");
        }
        if self.credentials.wwo_key_file.is_none() || env.contains_key("WTTR_WWO_KEY_FILE") {
            self.credentials.wwo_key_file = key_file("WTTR_WWO_KEY_FILE", ".wwo.key");
        }
    }

    /// 校验配置，汇总全部问题后一次性报错
    pub fn validate(&self) -> Result<()> {
        let problems = super::validators::validate_config(self);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(WttrError::configuration(problems.join("; ")))
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 可信反向代理（IP 或 CIDR），来自这些地址的请求使用 X-Forwarded-For
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// 目录与数据文件路径
///
/// 未显式配置的路径都从 `root_dir` 推导。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub geolite_db: Option<PathBuf>,
    #[serde(default)]
    pub blacklist: Option<PathBuf>,
    #[serde(default)]
    pub aliases: Option<PathBuf>,
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("data"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("cache"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("log"))
    }

    pub fn geolite_db(&self) -> PathBuf {
        self.geolite_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("GeoLite2-City.mmdb"))
    }

    pub fn blacklist(&self) -> PathBuf {
        self.blacklist
            .clone()
            .unwrap_or_else(|| self.root_dir.join("share").join("blacklist"))
    }

    pub fn aliases(&self) -> PathBuf {
        self.aliases
            .clone()
            .unwrap_or_else(|| self.root_dir.join("share").join("aliases"))
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// 主日志文件，空则输出到控制台
    #[serde(default)]
    pub file: Option<String>,
    /// 访问日志文件（JSON 行），空则不单独写访问日志
    #[serde(default = "default_access_file")]
    pub access_file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 限流窗口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    pub name: String,
    pub duration_secs: u64,
    pub max_queries: u64,
}

/// 查询限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowConfig>,
}

/// 默认位置（所有 provider 都失败时使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// IP 定位配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// provider 优先顺序：geoip, ip2location, ipinfo
    #[serde(default = "default_geoip_order")]
    pub order: Vec<String>,
    /// 单个 provider 的查询超时
    #[serde(default = "default_geoip_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_location_ttl")]
    pub location_ttl_secs: u64,
    /// 使用 `{ip}` 和 `{key}` 作为占位符
    #[serde(default = "default_ip2location_url")]
    pub ip2location_url: String,
    #[serde(default = "default_ipinfo_url")]
    pub ipinfo_url: String,
    /// 地名解析服务地址，空则不解析地名
    #[serde(default = "default_geolocator_url")]
    pub geolocator_url: String,
    #[serde(default = "default_default_location")]
    pub default_location: DefaultLocationConfig,
}

impl GeoIpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn location_ttl(&self) -> Duration {
        Duration::from_secs(self.location_ttl_secs)
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_proxy_ttl")]
    pub proxy_ttl_secs: u64,
    #[serde(default = "default_lru_max_bytes")]
    pub lru_max_bytes: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn proxy_ttl(&self) -> Duration {
        Duration::from_secs(self.proxy_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 上游天气服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_wwo_url")]
    pub wwo_url: String,
    #[serde(default = "default_metno_url")]
    pub metno_url: String,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// 出站 User-Agent，空则使用内置值
    #[serde(default)]
    pub user_agent: String,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn effective_user_agent(&self) -> String {
        if self.user_agent.trim().is_empty() {
            concat!("wttr-gate/", env!("CARGO_PKG_VERSION")).to_string()
        } else {
            self.user_agent.clone()
        }
    }
}

/// 凭据文件路径（文件是否存在决定 provider / backend 是否可用）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialFiles {
    #[serde(default)]
    pub ip2location_key_file: Option<PathBuf>,
    #[serde(default)]
    pub ipinfo_key_file: Option<PathBuf>,
    #[serde(default)]
    pub wwo_key_file: Option<PathBuf>,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8002
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_access_file() -> Option<String> {
    Some("log/access.log".to_string())
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_windows() -> Vec<WindowConfig> {
    vec![
        WindowConfig {
            name: "minute".to_string(),
            duration_secs: 60,
            max_queries: 300,
        },
        WindowConfig {
            name: "hour".to_string(),
            duration_secs: 3600,
            max_queries: 3600,
        },
        WindowConfig {
            name: "day".to_string(),
            duration_secs: 24 * 3600,
            max_queries: 24 * 3600,
        },
    ]
}

fn default_geoip_order() -> Vec<String> {
    vec![
        "geoip".to_string(),
        "ip2location".to_string(),
        "ipinfo".to_string(),
    ]
}

fn default_geoip_timeout_ms() -> u64 {
    2000
}

fn default_location_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_ip2location_url() -> String {
    "https://api.ip2location.io/?key={key}&ip={ip}".to_string()
}

fn default_ipinfo_url() -> String {
    "https://ipinfo.io/{ip}/json?token={key}".to_string()
}

fn default_geolocator_url() -> String {
    "http://localhost:8004".to_string()
}

fn default_default_location() -> DefaultLocationConfig {
    DefaultLocationConfig {
        name: "oymyakon".to_string(),
        latitude: 63.4608,
        longitude: 142.7858,
    }
}

fn default_proxy_ttl() -> u64 {
    1800
}

fn default_lru_max_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_wwo_url() -> String {
    "http://api.worldweatheronline.com/premium/v1/weather.ashx".to_string()
}

fn default_metno_url() -> String {
    "https://api.met.no/weatherapi/locationforecast/2.0/complete".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            data_dir: None,
            cache_dir: None,
            log_dir: None,
            geolite_db: None,
            blacklist: None,
            aliases: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            access_file: default_access_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
        }
    }
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            order: default_geoip_order(),
            timeout_ms: default_geoip_timeout_ms(),
            location_ttl_secs: default_location_ttl(),
            ip2location_url: default_ip2location_url(),
            ipinfo_url: default_ipinfo_url(),
            geolocator_url: default_geolocator_url(),
            default_location: default_default_location(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            proxy_ttl_secs: default_proxy_ttl(),
            lru_max_bytes: default_lru_max_bytes(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            wwo_url: default_wwo_url(),
            metno_url: default_metno_url(),
            timeout_ms: default_upstream_timeout_ms(),
            user_agent: String::new(),
        }
    }
}
