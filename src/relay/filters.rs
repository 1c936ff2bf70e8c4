// Named keyword filters applied to discovered items

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::errors::RelayError;
use super::models::DiscoveredItem;

/// Keep if any `or_keywords` appears in the title, drop if any `no_keywords` does.
/// An empty list disables its clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFilter {
    #[serde(default)]
    pub or_keywords: Vec<String>,
    #[serde(default)]
    pub no_keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn any_of(keywords: &[&str]) -> Self {
        Self {
            or_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            no_keywords: Vec::new(),
        }
    }

    pub fn none_of(keywords: &[&str]) -> Self {
        Self {
            or_keywords: Vec::new(),
            no_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn keeps(&self, title: &str) -> bool {
        if !self.or_keywords.is_empty() && !self.or_keywords.iter().any(|k| title.contains(k.as_str())) {
            return false;
        }
        !self.no_keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// Locators of the kept items, in input order
    pub fn apply(&self, items: &[DiscoveredItem]) -> Vec<String> {
        items
            .iter()
            .filter(|item| self.keeps(&item.title))
            .map(|item| item.locator.clone())
            .collect()
    }
}

/// Fixed set of filters addressable by name
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    identity: KeywordFilter,
    filters: HashMap<String, KeywordFilter>,
}

impl FilterRegistry {
    pub fn builtin() -> Self {
        let mut filters = HashMap::new();
        filters.insert("karaoke".to_string(), KeywordFilter::any_of(&["歌", "唱", "黑听"]));
        filters.insert(
            "moonlight".to_string(),
            KeywordFilter::any_of(&["歌", "唱", "黑听", "猫猫头播放器"]),
        );
        filters.insert("steria".to_string(), KeywordFilter::any_of(&["歌", "唱", "黑听", "早安"]));
        filters.insert("nopart".to_string(), KeywordFilter::none_of(&["part"]));
        filters.insert("nogame".to_string(), KeywordFilter::none_of(&["游戏"]));
        filters.insert("song_from_stream".to_string(), KeywordFilter::any_of(&["歌切"]));
        filters.insert("hachi".to_string(), KeywordFilter::any_of(&["歌回合集"]));
        filters.insert("no-song-cut".to_string(), KeywordFilter::none_of(&["[歌切]"]));

        Self {
            identity: KeywordFilter::identity(),
            filters,
        }
    }

    pub fn with_filter(mut self, name: impl Into<String>, filter: KeywordFilter) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    /// `None` is the identity filter; an unknown name is a config error
    pub fn resolve(&self, name: Option<&str>) -> Result<&KeywordFilter, RelayError> {
        match name {
            None => Ok(&self.identity),
            Some(name) => self
                .filters
                .get(name)
                .ok_or_else(|| RelayError::UnknownFilter(name.to_string())),
        }
    }

    pub fn apply(&self, name: Option<&str>, items: &[DiscoveredItem]) -> Result<Vec<String>, RelayError> {
        Ok(self.resolve(name)?.apply(items))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
