// Discovery hand-off as an append-only JSON lines file

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::errors::RelayError;
use super::models::WatchReport;
use super::traits::DiscoverySink;

/// Appends one `{"source":..,"locators":[..]}` line per report
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DiscoverySink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn deliver(&self, report: &WatchReport) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(report)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), source = %report.source, count = report.locators.len(), "discoveries queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(source: &str, locators: &[&str]) -> WatchReport {
        WatchReport {
            source: source.to_string(),
            locators: locators.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_reports_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("queue").join("discovered.jsonl"));

        sink.deliver(&report("koeiil", &["https://www.bilibili.com/video/BV3"])).await.unwrap();
        sink.deliver(&report("other", &["https://www.bilibili.com/video/BV9", "https://www.bilibili.com/video/BV8"]))
            .await
            .unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<WatchReport> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].source, "koeiil");
        assert_eq!(lines[1].locators.len(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_queue_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let sink = JsonLinesSink::new(blocker.join("discovered.jsonl"));

        assert!(sink.deliver(&report("koeiil", &["u"])).await.is_err());
    }
}
