// Same-day rebroadcast suppression
//
// Uploaders re-post a day's stream cut under several listings. Titles that
// carry the marker keyword are keyed by (marker, date); the first title for a
// date wins. Titles without the marker or without a date always pass.

use regex::Regex;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

lazy_static::lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub keyword: String,
    pub date: String,
}

/// Set of seen (marker, date) pairs. Its owner decides the scope: one per
/// crawl for isolation, or one passed to several crawls to share it.
#[derive(Debug)]
pub struct Deduplicator {
    marker: String,
    seen: Mutex<HashSet<DedupKey>>,
}

impl Deduplicator {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Key for a title, if it is subject to deduplication at all
    pub fn key_for(&self, title: &str) -> Option<DedupKey> {
        if self.marker.is_empty() || !title.contains(&self.marker) {
            return None;
        }
        let date = DATE_RE.captures(title)?.get(1)?.as_str().to_string();
        Some(DedupKey {
            keyword: self.marker.clone(),
            date,
        })
    }

    /// `true` if the title is accepted (not a repeat)
    pub fn observe(&self, title: &str) -> bool {
        let Some(key) = self.key_for(title) else {
            return true;
        };
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains(&key) {
            debug!(date = %key.date, title, "suppressing same-day repeat");
            return false;
        }
        seen.insert(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
