// Crawler - paginated discovery with cursor resumption
//
// Strategy:
// 1. Validate the URL against the extractor's pattern
// 2. Check a video cursor still exists; a deleted one degrades to "first page only"
// 3. Walk pages until an empty page, the cursor, or the page ceiling
// 4. Pace between pages with the extractor's configured delay
//
// Same-day dedup is scoped per call: `extract` isolates every crawl, while
// `extract_in` lets callers share one scope across several sources.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bilibili::{bvid_of, parse_page, scan_page, PageScan};
use super::diagnostics::{decode_payload, ApiStatus};
use super::local;
use super::traits::{fill_template, ExtractorKind, Pacing, PAGELIST_API};
use crate::relay::config::{CrawlConfig, NetworkConfig};
use crate::relay::dedup::Deduplicator;
use crate::relay::errors::RelayError;
use crate::relay::models::{DiscoveredItem, StopCursor};
use crate::relay::traits::PageFetcher;

pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    crawl: CrawlConfig,
    network: NetworkConfig,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, crawl: CrawlConfig, network: NetworkConfig) -> Self {
        Self {
            fetcher,
            crawl,
            network,
        }
    }

    /// Empty dedup scope keyed on the configured marker
    pub fn dedup_scope(&self) -> Deduplicator {
        Deduplicator::new(self.crawl.dedup_marker.clone())
    }

    /// Items published after `resume`, newest-first. Same inputs, same output.
    pub async fn extract(
        &self,
        kind: ExtractorKind,
        url: &str,
        resume: StopCursor,
    ) -> Result<Vec<DiscoveredItem>, RelayError> {
        self.extract_in(kind, url, resume, &self.dedup_scope()).await
    }

    /// Like `extract`, suppressing same-day repeats already seen by `dedup`
    pub async fn extract_in(
        &self,
        kind: ExtractorKind,
        url: &str,
        resume: StopCursor,
        dedup: &Deduplicator,
    ) -> Result<Vec<DiscoveredItem>, RelayError> {
        let captures = kind.resolve(url)?;

        if kind == ExtractorKind::LocalGlob {
            let items = local::expand_items(&captures[0].1)?;
            return Ok(scan_page(items, &resume, dedup).items);
        }

        let stop = self.resolve_cursor(resume).await;

        if !kind.is_paginated() {
            let api_url = kind.page_url(&captures, 1);
            let items = self.fetch_page(kind, &api_url).await?;
            return Ok(scan_page(items, &stop, dedup).items);
        }

        let delay = self.pacing(kind);
        let mut collected = Vec::new();
        for page in 1..=self.crawl.max_pages {
            let api_url = kind.page_url(&captures, page);
            let items = match self.fetch_page(kind, &api_url).await {
                Ok(items) => items,
                Err(e) if collected.is_empty() => return Err(e),
                Err(e) => {
                    warn!(extractor = kind.name(), page, error = %e, kept = collected.len(), "crawl aborted, returning partial results");
                    return Ok(collected);
                }
            };
            let raw_empty = items.is_empty();
            let scan = scan_page(items, &stop, dedup);
            let terminal = is_stop_page(raw_empty, &scan, &stop);
            collected.extend(scan.items);

            if terminal {
                debug!(extractor = kind.name(), page, "terminal page");
                break;
            }
            if page < self.crawl.max_pages {
                tokio::time::sleep(delay).await;
            }
        }

        info!(extractor = kind.name(), url, found = collected.len(), "crawl finished");
        Ok(collected)
    }

    /// Downgrade a cursor that points at a deleted video
    async fn resolve_cursor(&self, resume: StopCursor) -> StopCursor {
        let Some(bvid) = resume.locator().and_then(bvid_of) else {
            return resume;
        };
        if !self.crawl.validate_cursor {
            return resume;
        }

        let check_url = fill_template(PAGELIST_API, &[("bvid", bvid)], 1);
        let headers = self.headers(ExtractorKind::Episodes);
        match self.fetcher.fetch(&check_url, &headers).await {
            Ok(page) => match decode_payload(&check_url, &page.body) {
                Ok(payload) if ApiStatus::of(&payload) == ApiStatus::NotFound => {
                    warn!(cursor = ?resume.locator(), "cursor no longer exists, crawling first page only");
                    StopCursor::FirstPage
                }
                Ok(_) => resume,
                Err(e) => {
                    warn!(error = %e, "cursor validation unreadable, keeping cursor");
                    resume
                }
            },
            Err(e) => {
                warn!(fetcher = self.fetcher.name(), error = %e, "cursor validation failed, keeping cursor");
                resume
            }
        }
    }

    async fn fetch_page(&self, kind: ExtractorKind, api_url: &str) -> Result<Vec<DiscoveredItem>, RelayError> {
        debug!(extractor = kind.name(), url = api_url, "fetching page");
        let page = self.fetcher.fetch(api_url, &self.headers(kind)).await?;
        if !(200..300).contains(&page.status) {
            return Err(RelayError::payload(api_url, format!("HTTP {}", page.status)));
        }
        parse_page(kind, api_url, &page.body)
    }

    fn headers(&self, kind: ExtractorKind) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.network.user_agent.clone()),
            ("Referer".to_string(), self.network.referer.clone()),
        ];
        if kind.needs_cookie() {
            if let Some(cookie) = &self.network.cookie {
                headers.push(("Cookie".to_string(), cookie.clone()));
            }
        }
        headers
    }

    fn pacing(&self, kind: ExtractorKind) -> Duration {
        match kind.descriptor().pacing {
            Pacing::Listing => self.crawl.page_delay(),
            Pacing::SignedFeed => self.crawl.signed_feed_delay(),
            Pacing::None => Duration::ZERO,
        }
    }
}

fn is_stop_page(raw_empty: bool, scan: &PageScan, stop: &StopCursor) -> bool {
    raw_empty || scan.hit_stop || stop.is_first_page()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{archives_body, pagelist_body, ScriptedFetcher};
    use tokio::time::Instant;

    const SERIES_URL: &str = "https://space.bilibili.com/7/channel/seriesdetail?sid=9";

    fn series_api(page: u32) -> String {
        format!(
            "https://api.bilibili.com/x/series/archives?mid=7&series_id=9&only_normal=true&sort=desc&pn={}&ps=30",
            page
        )
    }

    fn bvids(range: std::ops::Range<usize>) -> Vec<(String, String)> {
        range.map(|i| (format!("video {}", i), format!("BV{}", i))).collect()
    }

    /// One marker-dated title per bvid, a different day each
    fn dated(range: std::ops::Range<usize>) -> Vec<(String, String)> {
        range
            .map(|i| (format!("[歌切] [koeiil] 2024-03-{:02} 夜歌", i + 1), format!("BV{}", i)))
            .collect()
    }

    fn crawler(fetcher: Arc<ScriptedFetcher>) -> Crawler {
        Crawler::new(fetcher, CrawlConfig::default(), NetworkConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_pages_then_empty() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&bvids(0..30)))
                .with_page(series_api(2), archives_body(&bvids(30..35)))
                .with_page(series_api(3), archives_body(&[])),
        );
        let crawler = crawler(fetcher.clone());

        let start = Instant::now();
        let items = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None)
            .await
            .unwrap();

        assert_eq!(items.len(), 35);
        assert_eq!(items[0].locator, "https://www.bilibili.com/video/BV0");
        assert_eq!(fetcher.call_count(), 3);
        let delay = CrawlConfig::default().page_delay();
        let elapsed = start.elapsed();
        assert!(elapsed >= delay * 2 && elapsed < delay * 3, "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_is_idempotent() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&bvids(0..30)))
                .with_page(series_api(2), archives_body(&bvids(30..35))),
        );
        let crawler = Crawler::new(
            fetcher.clone(),
            CrawlConfig::default().with_cursor_validation(false),
            NetworkConfig::default(),
        );
        let cursor = StopCursor::At("https://www.bilibili.com/video/BV32".to_string());

        let first = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, cursor.clone())
            .await
            .unwrap();
        let second = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, cursor)
            .await
            .unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(first.last().unwrap().locator, "https://www.bilibili.com/video/BV31");
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_titles_are_idempotent_per_call() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&dated(0..3)))
                .with_page(series_api(2), archives_body(&[])),
        );
        let crawler = crawler(fetcher);
        let cursor = StopCursor::At("https://www.bilibili.com/video/BV2".to_string());

        let first = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, cursor.clone())
            .await
            .unwrap();
        let second = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, cursor)
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_scope_suppresses_repeats_across_calls() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&dated(0..3)))
                .with_page(series_api(2), archives_body(&[])),
        );
        let crawler = Crawler::new(
            fetcher,
            CrawlConfig::default().with_cursor_validation(false),
            NetworkConfig::default(),
        );
        let scope = crawler.dedup_scope();

        let first = crawler
            .extract_in(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None, &scope)
            .await
            .unwrap();
        let second = crawler
            .extract_in(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None, &scope)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert!(second.is_empty());
        assert_eq!(scope.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_cursor_degrades_to_first_page() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(
                    "https://api.bilibili.com/x/player/pagelist?bvid=BVgone&jsonp=jsonp",
                    r#"{"code":-404,"message":"啥都木有"}"#,
                )
                .with_page(series_api(1), archives_body(&bvids(0..30)))
                .with_page(series_api(2), archives_body(&bvids(30..35))),
        );
        let crawler = crawler(fetcher.clone());

        let items = crawler
            .extract(
                ExtractorKind::ChannelSeries,
                SERIES_URL,
                StopCursor::At("https://www.bilibili.com/video/BVgone".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 30);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_cursor() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&bvids(0..30)))
                .with_page(series_api(2), archives_body(&bvids(30..35))),
        );
        let items = crawler(fetcher.clone())
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::FirstPage)
            .await
            .unwrap();
        assert_eq!(items.len(), 30);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_page_failure_keeps_partial_results() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&bvids(0..30)))
                .with_page(series_api(2), "<html>502</html>"),
        );
        let items = crawler(fetcher)
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None)
            .await
            .unwrap();
        assert_eq!(items.len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_failure_is_error() {
        let fetcher = Arc::new(ScriptedFetcher::new().with_page(series_api(1), "not json"));
        let err = crawler(fetcher)
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::SourcePayload { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_ceiling_ends_crawl() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_page(series_api(1), archives_body(&bvids(0..3)))
                .with_page(series_api(2), archives_body(&bvids(3..6)))
                .with_page(series_api(3), archives_body(&bvids(6..9))),
        );
        let crawler = Crawler::new(
            fetcher.clone(),
            CrawlConfig::default().with_max_pages(2),
            NetworkConfig::default(),
        );
        let items = crawler
            .extract(ExtractorKind::ChannelSeries, SERIES_URL, StopCursor::None)
            .await
            .unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_episodes_newest_first_after_cursor() {
        let fetcher = Arc::new(ScriptedFetcher::new().with_page(
            "https://api.bilibili.com/x/player/pagelist?bvid=BV1ep&jsonp=jsonp",
            pagelist_body(&["p1", "p2", "p3", "p4", "p5"]),
        ));
        let crawler = Crawler::new(
            fetcher,
            CrawlConfig::default().with_cursor_validation(false),
            NetworkConfig::default(),
        );
        let items = crawler
            .extract(
                ExtractorKind::Episodes,
                "https://www.bilibili.com/video/BV1ep",
                StopCursor::At("https://www.bilibili.com/video/BV1ep?p=2".to_string()),
            )
            .await
            .unwrap();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["p5", "p4", "p3"]);
    }

    #[tokio::test]
    async fn test_episode_payload_error_propagates() {
        let fetcher = Arc::new(ScriptedFetcher::new().with_page(
            "https://api.bilibili.com/x/player/pagelist?bvid=BV1ep&jsonp=jsonp",
            "{",
        ));
        let result = crawler(fetcher)
            .extract(ExtractorKind::Episodes, "https://www.bilibili.com/video/BV1ep", StopCursor::None)
            .await;
        assert!(matches!(result, Err(RelayError::SourcePayload { .. })));
    }

    #[tokio::test]
    async fn test_malformed_url_fails_before_fetching() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let err = crawler(fetcher.clone())
            .extract(ExtractorKind::from_name("bilicolle").unwrap(), "https://example.com/list", StopCursor::None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedSourceUrl { extractor: "bilicolle", .. }));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_feed_sends_cookie() {
        let api = "https://api.bilibili.com/x/space/wbi/arc/search?mid=5&pn=1&jsonp=jsonp&ps=50";
        let fetcher = Arc::new(ScriptedFetcher::new().with_page(
            api,
            r#"{"code":0,"data":{"list":{"vlist":[]}}}"#,
        ));
        let crawler = Crawler::new(
            fetcher.clone(),
            CrawlConfig::default(),
            NetworkConfig::default().with_cookie(Some("SESSDATA=abc".to_string())),
        );
        let items = crawler
            .extract(ExtractorKind::UserUpload, "https://space.bilibili.com/5/upload/video", StopCursor::None)
            .await
            .unwrap();
        assert!(items.is_empty());
        let headers = fetcher.headers_of(0);
        assert!(headers.contains(&("Cookie".to_string(), "SESSDATA=abc".to_string())));
    }

    #[tokio::test]
    async fn test_glob_lists_local_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("02.mp4"), b"x").unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pattern = format!("{}/*.mp4", dir.path().display());
        let items = crawler(fetcher.clone())
            .extract(ExtractorKind::LocalGlob, &pattern, StopCursor::None)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(fetcher.call_count(), 0);
    }
}
