// Watch list: persisted sources and their resume cursors

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use super::errors::RelayError;
use super::extractors::{Crawler, ExtractorKind};
use super::filters::FilterRegistry;
use super::models::{StopCursor, WatchReport};
use super::traits::DiscoverySink;

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub name: String,
    pub url: String,
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub filter: Option<String>,
    /// Newest locator seen by the previous poll
    #[serde(default)]
    pub last_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchList {
    /// `YYYY-MM-DD`; stamped on first save
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub sources: Vec<WatchEntry>,
}

fn old_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".old");
    PathBuf::from(name)
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

impl WatchList {
    /// Falls back to `<path>.old`, then to an empty list
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        for candidate in [path.to_path_buf(), old_path(path)] {
            match std::fs::read_to_string(&candidate) {
                Ok(content) => return Ok(serde_json::from_str(&content)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        info!(path = %path.display(), "no watch list yet");
        Ok(Self::default())
    }

    /// Rotates the current file to `<path>.old` before writing
    pub fn save(&self, path: &Path) -> Result<(), RelayError> {
        if path.exists() {
            std::fs::rename(path, old_path(path))?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Stamp `created`, or once it is older than `max_age_days` copy the list
    /// to `backup/<stem>_<created>.<ext>` and restart the clock.
    pub fn backup_if_stale(&mut self, path: &Path, max_age_days: i64) -> Result<Option<PathBuf>, RelayError> {
        self.backup_if_stale_on(path, max_age_days, today())
    }

    fn backup_if_stale_on(&mut self, path: &Path, max_age_days: i64, today: Date) -> Result<Option<PathBuf>, RelayError> {
        let stamp = |date: Date| date.format(DATE_FORMAT).map_err(|e| RelayError::Config(e.to_string()));

        let Some(created) = self.created.clone() else {
            self.created = Some(stamp(today)?);
            self.save(path)?;
            return Ok(None);
        };
        let created_on = Date::parse(&created, DATE_FORMAT)
            .map_err(|e| RelayError::Config(format!("bad watch list date '{}': {}", created, e)))?;
        if (today - created_on).whole_days() <= max_age_days {
            return Ok(None);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new(".")).join("backup");
        std::fs::create_dir_all(&dir)?;
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{}_{}.{}", stem, created, ext.to_string_lossy()),
            None => format!("{}_{}", stem, created),
        };
        let backup = dir.join(name);
        std::fs::write(&backup, serde_json::to_string_pretty(self)?)?;

        self.created = Some(stamp(today)?);
        self.save(path)?;
        info!(backup = %backup.display(), "watch list backed up");
        Ok(Some(backup))
    }
}

pub struct Watcher {
    crawler: Crawler,
    filters: FilterRegistry,
    sink: Arc<dyn DiscoverySink>,
}

impl Watcher {
    pub fn new(crawler: Crawler, filters: FilterRegistry, sink: Arc<dyn DiscoverySink>) -> Self {
        Self { crawler, filters, sink }
    }

    /// Crawl every source from its cursor and hand what survives its filter to
    /// the sink. A cursor advances to the newest item seen only once the sink
    /// took the report. A failing source is logged and skipped.
    ///
    /// Same-day repeats are suppressed across the sources of one poll.
    pub async fn poll(&self, list: &mut WatchList) -> Vec<WatchReport> {
        let dedup = self.crawler.dedup_scope();
        let mut reports = Vec::new();
        for entry in &mut list.sources {
            let cursor = StopCursor::from_last(entry.last_url.as_deref());
            let items = match self.crawler.extract_in(entry.extractor, &entry.url, cursor, &dedup).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(source = %entry.name, error = %e, "poll failed");
                    continue;
                }
            };
            let Some(newest) = items.first() else {
                continue;
            };
            let newest = newest.locator.clone();

            let locators = match self.filters.apply(entry.filter.as_deref(), &items) {
                Ok(locators) => locators,
                Err(e) => {
                    warn!(source = %entry.name, error = %e, "filter misconfigured, cursor kept");
                    continue;
                }
            };
            let report = WatchReport {
                source: entry.name.clone(),
                locators,
            };
            if !report.locators.is_empty() {
                if let Err(e) = self.sink.deliver(&report).await {
                    warn!(source = %entry.name, sink = self.sink.name(), error = %e, "hand-off failed, cursor kept");
                    continue;
                }
            }

            entry.last_url = Some(newest);
            info!(source = %entry.name, found = items.len(), kept = report.locators.len(), "new items");
            reports.push(report);
        }
        reports
    }
}
