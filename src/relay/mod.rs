// Relay module - discovery and upload dispatch

pub mod backends;
pub mod command;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod extractors;
pub mod filters;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod retry_queue;
pub mod sink;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RelayConfig;
pub use dedup::Deduplicator;
pub use errors::RelayError;
pub use extractors::{Crawler, ExtractorKind};
pub use filters::{FilterRegistry, KeywordFilter};
pub use models::{
    DiscoveredItem, DispatchMode, DispatchOutcome, StopCursor, UploadBatch, UploadRequest, WatchReport,
};
pub use orchestrator::Dispatcher;
pub use retry_queue::{spawn_retry_loop, RetryQueue};
pub use sink::JsonLinesSink;
pub use traits::{DiscoverySink, PageFetcher, TaskQueue, UploadExecutor};
pub use watcher::{WatchList, Watcher};
