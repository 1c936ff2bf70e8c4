// Local artifact listing (filesystem glob, no network)

use std::path::PathBuf;

use crate::relay::errors::RelayError;
use crate::relay::models::DiscoveredItem;

/// Paths matching `pattern`, sorted lexicographically
pub fn expand(pattern: &str) -> Result<Vec<PathBuf>, RelayError> {
    let paths = glob::glob(pattern).map_err(|e| RelayError::InvalidGlob(format!("{}: {}", pattern, e)))?;
    let mut matched: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    matched.sort();
    Ok(matched)
}

/// Locator-only items for every match
pub fn expand_items(pattern: &str) -> Result<Vec<DiscoveredItem>, RelayError> {
    Ok(expand(pattern)?
        .into_iter()
        .map(|path| DiscoveredItem::untitled(path.to_string_lossy()))
        .collect())
}
