// Batch planning: partition artifacts, attribute them, derive titles
//
// Seed basenames follow the "[uploader] title.ext" template; the bracketed
// uploader marker keys the side table that supplies source, description and
// tags for the upload.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::config::UploadConfig;
use super::errors::RelayError;
use super::models::{UploadBatch, UploadRequest};

const NOT_AVAILABLE: &str = "n/a";

lazy_static::lazy_static! {
    static ref MARKER_RE: Regex = Regex::new(r"^\[([^\]]+)\].+").unwrap();
}

/// uploader marker -> `[source, description, tags]`
#[derive(Debug, Clone, Default)]
pub struct SideTable {
    entries: HashMap<String, Vec<Value>>,
}

impl SideTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(content: &str) -> Result<Self, RelayError> {
        let entries = serde_json::from_str(content)?;
        Ok(Self { entries })
    }

    /// A missing file is an empty table
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no side table");
                Ok(Self::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self, RelayError> {
        path.map_or_else(|| Ok(Self::empty()), Self::load)
    }

    pub fn lookup(&self, marker: &str) -> Result<&[Value], RelayError> {
        self.entries
            .get(marker)
            .map(Vec::as_slice)
            .ok_or_else(|| RelayError::ConfigLookupMiss(marker.to_string()))
    }
}

/// Source, description and tags for one seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub marker: Option<String>,
    pub source: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl Attribution {
    /// Never fails: a lookup miss falls back to placeholders
    pub fn resolve(
        seed_basename: &str,
        table: &SideTable,
        source: Option<&str>,
        description: Option<&str>,
    ) -> Self {
        let or_na = |value: Option<&str>| value.unwrap_or(NOT_AVAILABLE).to_string();

        let Some(marker) = uploader_marker(seed_basename) else {
            return Self {
                marker: None,
                source: or_na(source),
                description: or_na(description),
                tags: vec![NOT_AVAILABLE.to_string()],
            };
        };

        let entry = match table.lookup(&marker) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "falling back to placeholder attribution");
                return Self {
                    source: or_na(source),
                    description: or_na(description),
                    tags: vec![marker.clone()],
                    marker: Some(marker),
                };
            }
        };

        let source = source
            .map(str::to_string)
            .or_else(|| entry.first().and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let description = description
            .map(str::to_string)
            .or_else(|| entry.get(1).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("关注{}：{}", marker, source));
        let tags = entry
            .get(2)
            .map(tags_of)
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(|| vec![marker.clone()]);

        Self {
            marker: Some(marker),
            source,
            description,
            tags,
        }
    }

    pub fn primary_tag(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or(NOT_AVAILABLE)
    }
}

fn tags_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(tag) => vec![tag.clone()],
        Value::Array(tags) => tags.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// "koeiil" from "[koeiil] 2024-03-01 night.mp4"
pub fn uploader_marker(basename: &str) -> Option<String> {
    MARKER_RE
        .captures(basename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Title body (no prefix, no batch suffix)
pub fn derive_title(seed_basename: &str, attribution: &Attribution, upload: &UploadConfig) -> String {
    let stem = match seed_basename.rfind('.') {
        Some(dot) => &seed_basename[..dot],
        None => seed_basename,
    };
    let mut title = truncate_chars(stem, upload.max_title_chars);
    if let Some(marker) = &attribution.marker {
        title = title.replace(marker.as_str(), attribution.primary_tag());
    }
    if !upload.live_replay_marker.is_empty() {
        title = title.replace(upload.live_replay_marker.as_str(), "");
    }
    truncate_chars(&title, upload.max_title_chars)
}

/// "" for the first batch, then "_a", "_b", ..., "_z", "_aa", ...
pub fn batch_suffix(index: usize) -> String {
    if index == 0 {
        return String::new();
    }
    let mut n = index - 1;
    let mut letters = Vec::new();
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    letters.reverse();
    format!("_{}", letters.into_iter().collect::<String>())
}

/// Sorted contiguous chunks of at most `limit`
pub fn partition(artifacts: &[PathBuf], limit: usize) -> Vec<Vec<PathBuf>> {
    let mut sorted = artifacts.to_vec();
    sorted.sort();
    sorted.chunks(limit.max(1)).map(<[PathBuf]>::to_vec).collect()
}

fn is_seed(artifact: &Path, seed_basename: &str) -> bool {
    artifact.as_os_str() == seed_basename
        || artifact.file_name().is_some_and(|name| name == seed_basename)
}

pub struct BatchPlanner<'a> {
    upload: &'a UploadConfig,
    side_table: SideTable,
}

impl<'a> BatchPlanner<'a> {
    pub fn new(upload: &'a UploadConfig, side_table: SideTable) -> Self {
        Self { upload, side_table }
    }

    pub fn plan(&self, request: &UploadRequest) -> Vec<UploadBatch> {
        let attribution = Attribution::resolve(
            &request.seed_basename,
            &self.side_table,
            request.source.as_deref(),
            request.description.as_deref(),
        );
        let title = derive_title(&request.seed_basename, &attribution, self.upload);

        let batches: Vec<UploadBatch> = partition(&request.artifacts, request.episode_limit)
            .into_iter()
            .enumerate()
            .filter_map(|(index, chunk)| {
                let artifacts: Vec<PathBuf> = chunk
                    .into_iter()
                    .filter(|artifact| !is_seed(artifact, &request.seed_basename))
                    .collect();
                if artifacts.is_empty() {
                    return None;
                }
                let index = request.batch_offset + index;
                Some(UploadBatch {
                    artifacts,
                    title: format!("{}{}{}", self.upload.title_prefix, title, batch_suffix(index)),
                    description: attribution.description.clone(),
                    tags: attribution.tags.clone(),
                    source: attribution.source.clone(),
                    route: request.route.clone(),
                    index,
                })
            })
            .collect();

        info!(
            seed = %request.seed_basename,
            artifacts = request.artifacts.len(),
            batches = batches.len(),
            "planned upload"
        );
        batches
    }
}
