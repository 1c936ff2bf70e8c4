// Collaborator traits: listing transport, discovery hand-off, upload executable, worker queue

use async_trait::async_trait;

use super::errors::RelayError;
use super::models::WatchReport;

/// Raw response for one listing page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Issues one paginated request per call
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Name of the fetcher (for logging)
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, RelayError>;
}

/// Takes ownership of newly discovered locators. A source's cursor only
/// moves past what a sink accepted.
#[async_trait]
pub trait DiscoverySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &WatchReport) -> Result<(), RelayError>;
}

/// Runs a fully-formed upload command
#[async_trait]
pub trait UploadExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `argv[0]` is the program. Non-zero exit is `RelayError::UploadExecution`.
    async fn execute(&self, argv: &[String]) -> Result<(), RelayError>;
}

/// Fire-and-forget hand-off to an asynchronous worker pool
#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn name(&self) -> &'static str;

    /// `payload` is the upload argv serialized as a JSON array of strings
    async fn submit(&self, payload: String) -> Result<(), RelayError>;
}
