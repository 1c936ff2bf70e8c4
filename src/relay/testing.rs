// Test doubles for the collaborator traits

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::errors::RelayError;
use super::models::WatchReport;
use super::traits::{DiscoverySink, FetchedPage, PageFetcher, TaskQueue, UploadExecutor};

/// Serves canned bodies by exact URL and records every request
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn headers_of(&self, call: usize) -> Vec<(String, String)> {
        self.calls.lock().unwrap()[call].1.clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, RelayError> {
        self.calls.lock().unwrap().push((url.to_string(), headers.to_vec()));
        self.pages
            .get(url)
            .map(|body| FetchedPage::ok(body.clone()))
            .ok_or_else(|| RelayError::Network(format!("no scripted page for {}", url)))
    }
}

/// Fails the first `failures` calls, records every argv
#[derive(Default)]
pub struct ScriptedExecutor {
    failures: usize,
    /// Deleted on the first call, as an uploader consuming part of a batch would
    consumed: Vec<PathBuf>,
    /// Every call fails as if the uploader were not installed
    tool_missing: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn missing_tool() -> Self {
        Self {
            tool_missing: true,
            ..Self::default()
        }
    }

    pub fn consuming(mut self, paths: Vec<PathBuf>) -> Self {
        self.consumed = paths;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// `-l=<route>` of every call, in order
    pub fn routes(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|argv| argv.iter().find_map(|a| a.strip_prefix("-l=").map(str::to_string)))
            .collect()
    }
}

#[async_trait]
impl UploadExecutor for ScriptedExecutor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, argv: &[String]) -> Result<(), RelayError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(argv.to_vec());
            calls.len()
        };
        if call == 1 {
            for path in &self.consumed {
                let _ = std::fs::remove_file(path);
            }
        }
        if self.tool_missing {
            return Err(RelayError::ToolNotFound("biliup".to_string()));
        }
        if call <= self.failures {
            return Err(RelayError::UploadExecution { code: Some(1) });
        }
        Ok(())
    }
}

/// Keeps submitted payloads; optionally refuses them
#[derive(Default)]
pub struct RecordingQueue {
    refuse: bool,
    payloads: Mutex<Vec<String>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn submit(&self, payload: String) -> Result<(), RelayError> {
        if self.refuse {
            return Err(RelayError::TaskQueue("queue closed".to_string()));
        }
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Keeps delivered reports; optionally refuses them
#[derive(Default)]
pub struct RecordingSink {
    refuse: bool,
    reports: Mutex<Vec<WatchReport>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<WatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscoverySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, report: &WatchReport) -> Result<(), RelayError> {
        if self.refuse {
            return Err(RelayError::Io(std::io::Error::other("queue unwritable")));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Series/collection page body with `(title, bvid)` entries
pub fn archives_body(entries: &[(String, String)]) -> String {
    let archives: Vec<serde_json::Value> = entries
        .iter()
        .map(|(title, bvid)| serde_json::json!({ "title": title, "bvid": bvid }))
        .collect();
    serde_json::json!({ "code": 0, "message": "0", "data": { "archives": archives } }).to_string()
}

/// Page-list body, parts numbered from 1
pub fn pagelist_body(parts: &[&str]) -> String {
    let data: Vec<serde_json::Value> = parts
        .iter()
        .enumerate()
        .map(|(i, part)| serde_json::json!({ "cid": 1000 + i, "page": i + 1, "part": part }))
        .collect();
    serde_json::json!({ "code": 0, "data": data }).to_string()
}
