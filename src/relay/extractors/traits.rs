// Extractor kinds and their listing descriptors

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::relay::errors::RelayError;

/// Every listing shape the crawler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExtractorKind {
    /// space.bilibili.com/<mid>/channel/seriesdetail?sid=<sid>
    ChannelSeries,
    /// space.bilibili.com/<mid>/lists/<sid>?type=series
    ChannelSeriesLists,
    /// space.bilibili.com/<mid>/channel/collectiondetail?sid=<sid>
    ChannelCollection,
    /// space.bilibili.com/<mid>/lists/<sid>?type=season
    ChannelCollectionLists,
    /// www.bilibili.com/video/<bvid> parts, oldest-first natively
    Episodes,
    /// space.bilibili.com/<mid>
    Channel,
    /// space.bilibili.com/<mid>/upload/video
    UserUpload,
    /// Filesystem glob, no network
    LocalGlob,
}

/// How a kind's payload is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingShape {
    /// data.archives[] {title, bvid}
    Archives,
    /// data.list.vlist[] {title, bvid}
    VideoList,
    /// data[] {part, page}, single request
    PageList,
    Glob,
}

/// Which configured delay applies between pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Listing,
    SignedFeed,
    None,
}

/// Immutable description of one listing shape
#[derive(Debug)]
pub struct ExtractorDescriptor {
    pub pattern: Regex,
    /// Captures that feed the API template, in order
    pub grouped_by: &'static [&'static str],
    /// `{name}` placeholders for captures, `{page}` for the page number
    pub api: &'static str,
    pub shape: ListingShape,
    pub pacing: Pacing,
}

pub const VIDEO_URL: &str = "https://www.bilibili.com/video/";
pub const PAGELIST_API: &str = "https://api.bilibili.com/x/player/pagelist?bvid={bvid}&jsonp=jsonp";

const SERIES_API: &str = "https://api.bilibili.com/x/series/archives?mid={mid}&series_id={sid}&only_normal=true&sort=desc&pn={page}&ps=30";
const COLLECTION_API: &str = "https://api.bilibili.com/x/polymer/space/seasons_archives_list?mid={mid}&season_id={sid}&sort_reverse=false&page_num={page}&page_size=30";
const UPLOAD_API: &str = "https://api.bilibili.com/x/space/wbi/arc/search?mid={mid}&pn={page}&jsonp=jsonp&ps=50";

lazy_static::lazy_static! {
    static ref CHANNEL_SERIES: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://space\.bilibili\.com/(?P<mid>\d+)/channel/seriesdetail.+sid=(?P<sid>\d+)").unwrap(),
        grouped_by: &["mid", "sid"],
        api: SERIES_API,
        shape: ListingShape::Archives,
        pacing: Pacing::Listing,
    };
    static ref CHANNEL_SERIES_LISTS: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://space\.bilibili\.com/(?P<mid>\d+)/lists/(?P<sid>\d+)\?type=series").unwrap(),
        grouped_by: &["mid", "sid"],
        api: SERIES_API,
        shape: ListingShape::Archives,
        pacing: Pacing::Listing,
    };
    static ref CHANNEL_COLLECTION: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://space\.bilibili\.com/(?P<mid>\d+)/channel/collectiondetail.+sid=(?P<sid>\d+)").unwrap(),
        grouped_by: &["mid", "sid"],
        api: COLLECTION_API,
        shape: ListingShape::Archives,
        pacing: Pacing::Listing,
    };
    static ref CHANNEL_COLLECTION_LISTS: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://space\.bilibili\.com/(?P<mid>\d+)/lists/(?P<sid>\d+)\?type=season").unwrap(),
        grouped_by: &["mid", "sid"],
        api: COLLECTION_API,
        shape: ListingShape::Archives,
        pacing: Pacing::Listing,
    };
    static ref EPISODES: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://www\.bilibili\.com/video/(?P<bvid>BV[0-9A-Za-z]+)").unwrap(),
        grouped_by: &["bvid"],
        api: PAGELIST_API,
        shape: ListingShape::PageList,
        pacing: Pacing::None,
    };
    static ref CHANNEL: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https://space\.bilibili\.com/(?P<mid>\d+)").unwrap(),
        grouped_by: &["mid"],
        api: UPLOAD_API,
        shape: ListingShape::VideoList,
        pacing: Pacing::SignedFeed,
    };
    static ref USER_UPLOAD: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^https?://space\.bilibili\.com/(?P<mid>\d+)/upload/video").unwrap(),
        grouped_by: &["mid"],
        api: UPLOAD_API,
        shape: ListingShape::VideoList,
        pacing: Pacing::SignedFeed,
    };
    static ref LOCAL_GLOB: ExtractorDescriptor = ExtractorDescriptor {
        pattern: Regex::new(r"^(?P<pattern>.+)$").unwrap(),
        grouped_by: &["pattern"],
        api: "",
        shape: ListingShape::Glob,
        pacing: Pacing::None,
    };
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 8] = [
        Self::ChannelSeries,
        Self::ChannelSeriesLists,
        Self::ChannelCollection,
        Self::ChannelCollectionLists,
        Self::Episodes,
        Self::Channel,
        Self::UserUpload,
        Self::LocalGlob,
    ];

    /// Registry key
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelSeries => "biliseries",
            Self::ChannelSeriesLists => "biliseries.new",
            Self::ChannelCollection => "bilicolle",
            Self::ChannelCollectionLists => "bilicolle.new",
            Self::Episodes => "biliepisode",
            Self::Channel => "bilichannel",
            Self::UserUpload => "biliuserupload",
            Self::LocalGlob => "glob",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, RelayError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| RelayError::UnknownExtractor(name.to_string()))
    }

    pub fn descriptor(&self) -> &'static ExtractorDescriptor {
        match self {
            Self::ChannelSeries => &CHANNEL_SERIES,
            Self::ChannelSeriesLists => &CHANNEL_SERIES_LISTS,
            Self::ChannelCollection => &CHANNEL_COLLECTION,
            Self::ChannelCollectionLists => &CHANNEL_COLLECTION_LISTS,
            Self::Episodes => &EPISODES,
            Self::Channel => &CHANNEL,
            Self::UserUpload => &USER_UPLOAD,
            Self::LocalGlob => &LOCAL_GLOB,
        }
    }

    pub fn shape(&self) -> ListingShape {
        self.descriptor().shape
    }

    /// Whether a crawl of this kind walks pages
    pub fn is_paginated(&self) -> bool {
        matches!(self.shape(), ListingShape::Archives | ListingShape::VideoList)
    }

    /// Signed feeds want the session cookie
    pub fn needs_cookie(&self) -> bool {
        self.descriptor().pacing == Pacing::SignedFeed
    }

    pub fn matches(&self, url: &str) -> bool {
        self.descriptor().pattern.is_match(url)
    }

    /// Captured groups in `grouped_by` order
    pub fn resolve(&self, url: &str) -> Result<Vec<(&'static str, String)>, RelayError> {
        let descriptor = self.descriptor();
        let malformed = || RelayError::MalformedSourceUrl {
            extractor: self.name(),
            url: url.to_string(),
        };
        let caps = descriptor.pattern.captures(url).ok_or_else(malformed)?;
        descriptor
            .grouped_by
            .iter()
            .map(|group| {
                caps.name(group)
                    .map(|m| (*group, m.as_str().to_string()))
                    .ok_or_else(malformed)
            })
            .collect()
    }

    /// API URL for a 1-indexed page
    pub fn page_url(&self, captures: &[(&'static str, String)], page: u32) -> String {
        fill_template(self.descriptor().api, captures, page)
    }
}

pub(crate) fn fill_template(template: &str, captures: &[(&'static str, String)], page: u32) -> String {
    let mut url = template.to_string();
    for (name, value) in captures {
        url = url.replace(&format!("{{{}}}", name), value);
    }
    url.replace("{page}", &page.to_string())
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ExtractorKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for ExtractorKind {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<ExtractorKind> for String {
    fn from(kind: ExtractorKind) -> Self {
        kind.name().to_string()
    }
}
