// Common data models for discovery and dispatch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One item found on a remote listing (or a local artifact)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub title: String,
    /// Stable identity: remote URL or local path
    pub locator: String,
}

impl DiscoveredItem {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
        }
    }

    /// Locator-only item (local glob expansion)
    pub fn untitled(locator: impl Into<String>) -> Self {
        Self::new(String::new(), locator)
    }
}

/// New locators found for one watched source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchReport {
    pub source: String,
    pub locators: Vec<String>,
}

/// Where a crawl should stop
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopCursor {
    /// Crawl until an empty page
    #[default]
    None,
    /// Stop after the first page
    FirstPage,
    /// Stop at the item a previous crawl ended on (exclusive)
    At(String),
}

impl StopCursor {
    /// Cursor from a persisted "last seen" locator
    pub fn from_last(last: Option<&str>) -> Self {
        match last {
            Some(locator) if !locator.is_empty() => Self::At(locator.to_string()),
            _ => Self::None,
        }
    }

    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::At(locator) => Some(locator),
            _ => None,
        }
    }

    pub fn is_first_page(&self) -> bool {
        matches!(self, Self::FirstPage)
    }
}

/// How a batch leaves the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Run the uploader in-process with the retry loop
    Inline,
    /// Relocate artifacts and hand the command to the task queue
    #[default]
    Delegated,
}

/// Everything needed to (re)plan an upload; also the retry queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub artifacts: Vec<PathBuf>,
    /// Basename of the media the artifacts were cut from ("[uploader] title.mp4")
    pub seed_basename: String,
    pub source: Option<String>,
    pub description: Option<String>,
    pub episode_limit: usize,
    pub route: String,
    pub mode: DispatchMode,
    /// Position of the first planned batch; keeps `_a`/`_b` titles on requeue
    #[serde(default)]
    pub batch_offset: usize,
}

impl UploadRequest {
    pub fn new(artifacts: Vec<PathBuf>, seed_basename: impl Into<String>) -> Self {
        Self {
            artifacts,
            seed_basename: seed_basename.into(),
            source: None,
            description: None,
            episode_limit: 180,
            route: "qn".to_string(),
            mode: DispatchMode::Delegated,
            batch_offset: 0,
        }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_episode_limit(mut self, limit: usize) -> Self {
        self.episode_limit = limit;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A bounded group of artifacts uploaded under one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub artifacts: Vec<PathBuf>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub source: String,
    pub route: String,
    /// Position within the planned request (0 for the unsuffixed batch)
    pub index: usize,
}

impl UploadBatch {
    /// Identity used for holding directories and single-flight checks
    pub fn identity(&self) -> &str {
        &self.title
    }

    /// Title turned into a directory name
    pub fn dir_name(&self) -> String {
        self.title
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                other => other,
            })
            .collect()
    }
}

/// Lifecycle of a single dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Quarantined,
}

/// A batch in flight; mutated in place as retries rotate routes
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub batch: UploadBatch,
    pub route: String,
    pub retry_count: u32,
    pub state: AttemptState,
}

impl DispatchAttempt {
    pub fn new(batch: UploadBatch) -> Self {
        let route = batch.route.clone();
        Self {
            batch,
            route,
            retry_count: 0,
            state: AttemptState::Pending,
        }
    }
}

/// Terminal result of dispatching one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    /// Handed to the task queue; the pipeline no longer tracks it
    Delegated { holding_dir: PathBuf },
    /// Retries exhausted; artifacts moved aside and requeued
    Quarantined { quarantine_dir: PathBuf, remaining: usize },
    /// Another attempt with the same identity is running; requeued
    Busy,
}
