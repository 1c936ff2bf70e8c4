// Error types for discovery and dispatch

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Source URL does not match the extractor's pattern
    #[error("Malformed source URL for {extractor}: {url}")]
    MalformedSourceUrl { extractor: &'static str, url: String },

    /// Listing page could not be parsed (or the API answered with an error code)
    #[error("Source payload error from {url}: {reason}")]
    SourcePayload { url: String, reason: String },

    /// Transport failure while talking to the listing API
    #[error("Network error: {0}")]
    Network(String),

    /// Upload executable exited non-zero (or was killed)
    #[error("Upload failed with exit code {code:?}")]
    UploadExecution { code: Option<i32> },

    /// Every inline retry for a batch was consumed
    #[error("Routes exhausted for '{title}' after {attempts} attempts")]
    RouteExhausted { title: String, attempts: u32 },

    /// Side-table has no entry for an uploader marker
    #[error("No side-table entry for '{0}'")]
    ConfigLookupMiss(String),

    #[error("Unknown extractor: {0}")]
    UnknownExtractor(String),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// Task queue refused or dropped a job
    #[error("Task queue error: {0}")]
    TaskQueue(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub fn payload(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourcePayload {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether another route might succeed. Anything else goes straight to quarantine.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UploadExecution { .. } | Self::Network(_) | Self::TaskQueue(_) | Self::Io(_)
        )
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Network(format!("timed out: {}", e));
        }
        if e.is_decode() {
            let url = e.url().map(|u| u.to_string()).unwrap_or_default();
            return Self::payload(url, e.to_string());
        }
        Self::Network(e.to_string())
    }
}
