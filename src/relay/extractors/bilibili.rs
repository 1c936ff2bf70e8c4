// Bilibili listing payloads -> discovered items

use serde_json::Value;

use super::diagnostics::decode_ok_payload;
use super::traits::{ExtractorKind, ListingShape, VIDEO_URL};
use crate::relay::dedup::Deduplicator;
use crate::relay::errors::RelayError;
use crate::relay::models::{DiscoveredItem, StopCursor};

/// Result of scanning one page against the stop cursor
#[derive(Debug, Default)]
pub struct PageScan {
    pub items: Vec<DiscoveredItem>,
    /// The stop locator was found on this page
    pub hit_stop: bool,
}

/// Parse one page body into items, newest-first.
///
/// Episode lists are oldest-first on the wire and come back reversed.
pub fn parse_page(kind: ExtractorKind, url: &str, body: &str) -> Result<Vec<DiscoveredItem>, RelayError> {
    let payload = decode_ok_payload(url, body)?;
    let data = payload
        .get("data")
        .ok_or_else(|| RelayError::payload(url, "missing data"))?;

    match kind.shape() {
        ListingShape::Archives => video_entries(url, data.get("archives")),
        ListingShape::VideoList => video_entries(url, data.get("list").and_then(|l| l.get("vlist"))),
        ListingShape::PageList => {
            let bvid = bvid_from_api(url).ok_or_else(|| RelayError::payload(url, "cannot determine bvid"))?;
            let mut items = part_entries(url, &bvid, data)?;
            items.reverse();
            Ok(items)
        }
        ListingShape::Glob => Err(RelayError::payload(url, "glob listings have no payload")),
    }
}

/// `{title, bvid}` objects; a null or absent list is an empty page
fn video_entries(url: &str, list: Option<&Value>) -> Result<Vec<DiscoveredItem>, RelayError> {
    let entries = match list {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(RelayError::payload(url, "listing is not an array")),
    };

    entries
        .iter()
        .map(|entry| {
            let title = entry.get("title").and_then(Value::as_str);
            let bvid = entry.get("bvid").and_then(Value::as_str);
            match (title, bvid) {
                (Some(title), Some(bvid)) => Ok(DiscoveredItem::new(title, video_locator(bvid))),
                _ => Err(RelayError::payload(url, "entry without title/bvid")),
            }
        })
        .collect()
}

/// `{part, page}` objects of a multi-part video
fn part_entries(url: &str, bvid: &str, data: &Value) -> Result<Vec<DiscoveredItem>, RelayError> {
    let parts = data
        .as_array()
        .ok_or_else(|| RelayError::payload(url, "page list is not an array"))?;

    parts
        .iter()
        .map(|part| {
            let title = part.get("part").and_then(Value::as_str);
            let page = part.get("page").and_then(Value::as_u64);
            match (title, page) {
                (Some(title), Some(page)) => Ok(DiscoveredItem::new(
                    title,
                    format!("{}{}?p={}", VIDEO_URL, bvid, page),
                )),
                _ => Err(RelayError::payload(url, "part without title/page")),
            }
        })
        .collect()
}

fn bvid_from_api(url: &str) -> Option<String> {
    let start = url.find("bvid=")? + "bvid=".len();
    let rest = &url[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

pub fn video_locator(bvid: &str) -> String {
    format!("{}{}", VIDEO_URL, bvid)
}

/// bvid of a video locator (`https://www.bilibili.com/video/BV...`)
pub fn bvid_of(locator: &str) -> Option<String> {
    ExtractorKind::Episodes
        .resolve(locator)
        .ok()
        .and_then(|caps| caps.into_iter().next())
        .map(|(_, bvid)| bvid)
}

/// Walk a parsed page in order, cutting at the stop locator.
///
/// The stop item and everything after it are never emitted nor observed by the
/// deduplicator; same-day repeats before it are dropped.
pub fn scan_page(items: Vec<DiscoveredItem>, stop: &StopCursor, dedup: &Deduplicator) -> PageScan {
    let mut scan = PageScan::default();
    for item in items {
        if stop.locator() == Some(item.locator.as_str()) {
            scan.hit_stop = true;
            break;
        }
        if dedup.observe(&item.title) {
            scan.items.push(item);
        }
    }
    scan
}
