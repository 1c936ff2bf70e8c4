// Runtime configuration (JSON, every field defaulted)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::errors::RelayError;
use super::filters::KeywordFilter;
use super::models::DispatchMode;

pub const CONFIG_ENV: &str = "BILI_RELAY_CONFIG";

const DISCOVERY_QUEUE: &str = "discovered.jsonl";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Transport settings for the listing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub referer: String,
    /// Cookie header sent to the signed upload feeds
    pub cookie: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_seconds: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: "https://www.bilibili.com/".to_string(),
            cookie: None,
        }
    }
}

impl NetworkConfig {
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Delay between pages of the series/collection feeds
    pub page_delay_ms: u64,
    /// Delay between pages of the signed upload feeds
    pub signed_feed_delay_ms: u64,
    /// Runaway guard; reaching it simply ends the crawl
    pub max_pages: u32,
    /// Titles carrying this keyword are deduplicated by date
    pub dedup_marker: String,
    /// Ask the API whether a video cursor still exists before crawling
    pub validate_cursor: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: 500,
            signed_feed_delay_ms: 10_000,
            max_pages: 999,
            dedup_marker: "[歌切] [koeiil]".to_string(),
            validate_cursor: true,
        }
    }
}

impl CrawlConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn signed_feed_delay(&self) -> Duration {
        Duration::from_millis(self.signed_feed_delay_ms)
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_signed_feed_delay(mut self, delay: Duration) -> Self {
        self.signed_feed_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_dedup_marker(mut self, marker: impl Into<String>) -> Self {
        self.dedup_marker = marker.into();
        self
    }

    pub fn with_cursor_validation(mut self, enabled: bool) -> Self {
        self.validate_cursor = enabled;
        self
    }
}

/// Batch planning and command construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub program: String,
    /// Round-robin list; retry `n` uses `routes[n % len]`
    pub routes: Vec<String>,
    pub default_route: String,
    pub episode_limit: usize,
    pub copyright: u8,
    pub category_id: u32,
    pub title_prefix: String,
    /// Stripped from derived titles
    pub live_replay_marker: String,
    pub max_title_chars: usize,
    /// Created next to the artifacts for delegated batches
    pub holding_subdir: String,
    pub quarantine_root: PathBuf,
    pub mode: DispatchMode,
    /// At most one in-flight inline attempt per batch identity
    pub single_flight: bool,
    /// Kill an upload process running longer than this; unset waits forever
    pub timeout_secs: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            program: "biliup".to_string(),
            routes: vec!["qn".to_string()],
            default_route: "qn".to_string(),
            episode_limit: 180,
            copyright: 2,
            category_id: 31,
            title_prefix: "[歌切] ".to_string(),
            live_replay_marker: "【直播回放】".to_string(),
            max_title_chars: 60,
            holding_subdir: "inaupload".to_string(),
            quarantine_root: PathBuf::from("."),
            mode: DispatchMode::Delegated,
            single_flight: false,
            timeout_secs: None,
        }
    }
}

impl UploadConfig {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_routes(mut self, routes: Vec<String>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_quarantine_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.quarantine_root = root.into();
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u64>) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Route for the `retry`-th retry
    pub fn route_for(&self, retry: u32) -> &str {
        if self.routes.is_empty() {
            return &self.default_route;
        }
        &self.routes[retry as usize % self.routes.len()]
    }
}

/// Retry ceilings and pacing for dispatch and the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    /// Pause after every batch, whatever its outcome
    pub upload_interval_secs: u64,
    pub worker_attempts: u32,
    /// Ceiling on the pause between worker attempts
    pub worker_retry_delay_secs: u64,
    pub worker_interval_secs: u64,
    pub worker_concurrency: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 15,
            retry_interval_secs: 60,
            upload_interval_secs: 10,
            worker_attempts: 15,
            worker_retry_delay_secs: 60,
            worker_interval_secs: 10,
            worker_concurrency: 1,
        }
    }
}

impl RetryConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }

    pub fn worker_retry_delay(&self) -> Duration {
        Duration::from_secs(self.worker_retry_delay_secs)
    }

    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs)
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, seconds: u64) -> Self {
        self.retry_interval_secs = seconds;
        self
    }

    pub fn with_upload_interval(mut self, seconds: u64) -> Self {
        self.upload_interval_secs = seconds;
        self
    }
}

/// A local glob whose matches are uploaded as one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub pattern: String,
    pub seed_basename: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub episode_limit: Option<usize>,
    #[serde(default)]
    pub mode: Option<DispatchMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub crawl: CrawlConfig,
    pub upload: UploadConfig,
    pub retry: RetryConfig,
    /// uploader marker -> [source, description, tags]
    pub side_table_path: Option<PathBuf>,
    pub watch_list_path: Option<PathBuf>,
    /// Where discoveries are appended; defaults to `discovered.jsonl` beside the watch list
    pub discovery_queue_path: Option<PathBuf>,
    /// Extra named filters on top of the built-in registry
    pub filters: HashMap<String, KeywordFilter>,
    pub ingest: Vec<IngestJob>,
    pub poll_interval_secs: u64,
    /// Days before the watch list gets a dated backup copy
    pub backup_after_days: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            crawl: CrawlConfig::default(),
            upload: UploadConfig::default(),
            retry: RetryConfig::default(),
            side_table_path: None,
            watch_list_path: None,
            discovery_queue_path: None,
            filters: HashMap::new(),
            ingest: Vec::new(),
            poll_interval_secs: 600,
            backup_after_days: 7,
        }
    }
}

impl RelayConfig {
    /// Load from a JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| RelayError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `$BILI_RELAY_CONFIG`, else `<config_dir>/bili-relay/config.json`
    pub fn from_env() -> Result<Self, RelayError> {
        Self::load(&Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bili-relay")
            .join("config.json")
    }

    pub fn discovery_queue(&self) -> PathBuf {
        if let Some(path) = &self.discovery_queue_path {
            return path.clone();
        }
        self.watch_list_path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."))
            .join(DISCOVERY_QUEUE)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_crawl(mut self, crawl: CrawlConfig) -> Self {
        self.crawl = crawl;
        self
    }

    pub fn with_upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_side_table(mut self, path: Option<PathBuf>) -> Self {
        self.side_table_path = path;
        self
    }
}
