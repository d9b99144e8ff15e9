use serde::Deserialize;
use std::path::PathBuf;

/// Default API version sent with every request
pub const DEFAULT_API_VERSION: &str = "5.126";

/// Default method endpoint root
pub const DEFAULT_BASE_URL: &str = "https://api.vk.com/method";

/// Default spacing between consecutive API calls (2.5 calls per second)
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 400;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Access token used for every crawl request
    #[serde(rename = "access-token")]
    pub access_token: String,

    /// API version parameter
    #[serde(default = "default_version")]
    pub version: String,

    /// Root URL that method names are appended to
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Minimum time between two consecutive API calls (milliseconds)
    #[serde(rename = "request-interval", default = "default_request_interval")]
    pub request_interval: u64,
}

/// Crawl target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Group whose members are crawled
    #[serde(rename = "group-id")]
    pub group_id: u64,

    /// Directory holding the persisted tables
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

/// Optional log sinks in addition to the console
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file: FileSinkConfig,

    #[serde(default)]
    pub alert: AlertSinkConfig,
}

/// Log file sink
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub path: PathBuf,
}

/// Warning/error mirror delivered as a private message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Token of the account that sends the alerts
    #[serde(rename = "access-token", default)]
    pub access_token: String,

    /// Recipient of the alerts
    #[serde(rename = "user-id", default)]
    pub user_id: u64,
}

fn default_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_interval() -> u64 {
    DEFAULT_REQUEST_INTERVAL_MS
}
