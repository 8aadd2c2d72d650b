//! One scrape-merge-publish pass.
//!
//! Sources run in configured order, one request at a time. Each source's
//! start URLs are scraped in listed order; `html` sources follow pagination.
//! Results are merged with the previously published file and written back
//! atomically, so a failed run never leaves a half-written or empty feed.

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::config::{Config, SourceConfig, SourceKind};
use crate::error::RunError;
use crate::extract::{
    DetailExtractor, ExtractContext, Extracted, Extractor, HtmlExtractor, ParseError,
    PulseExtractor, UpstreamExtractor,
};
use crate::feed::{load_previous, render, Fetcher};
use crate::model::{FeedDocument, FeedItem};
use crate::output::write_atomic;

/// Items gathered from all sources in one run, before merging.
#[derive(Debug, Default)]
pub struct Collected {
    pub items: Vec<FeedItem>,
    /// Start URLs attempted.
    pub attempts: usize,
    /// Start URLs that failed and were skipped (`fail_fast = false` only).
    pub failures: usize,
    /// Records dropped for a missing title or link.
    pub skipped: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Items scraped this run, duplicates included.
    pub fresh: usize,
    /// Items read back from the previous output.
    pub previous: usize,
    /// Items in the published document.
    pub published: usize,
    pub skipped: usize,
    pub failed_attempts: usize,
    /// Where the feed was written; `None` for a dry run.
    pub path: Option<PathBuf>,
}

/// Scrapes every active source.
///
/// With `fail_fast` the first failing start URL aborts the run. Otherwise
/// failures are logged and skipped, unless every attempt failed.
pub async fn collect(
    config: &Config,
    fetcher: &Fetcher,
    now: DateTime<Utc>,
) -> Result<Collected, RunError> {
    let offset = config.feed.offset();
    let mut collected = Collected::default();

    let active: Vec<&SourceConfig> = config.sources.iter().filter(|s| s.active).collect();
    if active.is_empty() {
        return Err(RunError::NoActiveSources);
    }

    for source in active {
        for start in source.start_urls()? {
            collected.attempts += 1;
            match scrape_start(fetcher, source, &start, now, offset).await {
                Ok(extracted) => {
                    tracing::info!(
                        source = %source.name,
                        url = %start,
                        items = extracted.items.len(),
                        skipped = extracted.skipped,
                        "Scraped source"
                    );
                    collected.skipped += extracted.skipped;
                    collected.items.extend(extracted.items);
                }
                Err(e) if config.fail_fast => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        url = %start,
                        error = %e,
                        "Source failed, skipping it"
                    );
                    collected.failures += 1;
                }
            }
        }
    }

    if collected.attempts > 0 && collected.failures == collected.attempts {
        return Err(RunError::AllSourcesFailed(collected.attempts));
    }
    Ok(collected)
}

fn fetch_error(source: &SourceConfig, url: &Url, error: crate::feed::FetchError) -> RunError {
    RunError::Fetch {
        source_name: source.name.clone(),
        url: url.clone(),
        error,
    }
}

fn parse_error(source: &SourceConfig, url: &Url, error: ParseError) -> RunError {
    RunError::Parse {
        source_name: source.name.clone(),
        url: url.clone(),
        error,
    }
}

async fn scrape_start(
    fetcher: &Fetcher,
    source: &SourceConfig,
    start: &Url,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Extracted, RunError> {
    let ctx = ExtractContext {
        source: &source.name,
        page_url: start,
        now,
        offset,
    };

    match source.kind {
        SourceKind::Html => scrape_listing(fetcher, source, start, now, offset).await,
        SourceKind::PulseApi => {
            let api = PulseExtractor::api_url(start).map_err(|e| parse_error(source, start, e))?;
            let headers = PulseExtractor::headers(start).map_err(|e| parse_error(source, start, e))?;
            let body = fetcher
                .fetch_with(&api, &PulseExtractor::query(), headers)
                .await
                .map_err(|e| fetch_error(source, &api, e))?;
            PulseExtractor::new()
                .extract(&body, &ctx)
                .map_err(|e| parse_error(source, &api, e))
        }
        SourceKind::Feed => {
            let body = fetcher
                .fetch(start)
                .await
                .map_err(|e| fetch_error(source, start, e))?;
            UpstreamExtractor::new()
                .extract(&body, &ctx)
                .map_err(|e| parse_error(source, start, e))
        }
    }
}

/// Scrapes an `html` start URL and the pages it links to as "next".
///
/// The first page must fetch and parse. A later page that fails ends
/// pagination with a warning; what was already collected is kept. With
/// detail rules every item link is then followed as well.
async fn scrape_listing(
    fetcher: &Fetcher,
    source: &SourceConfig,
    start: &Url,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Extracted, RunError> {
    let rules = source.rules.as_ref().ok_or_else(|| {
        parse_error(
            source,
            start,
            ParseError::StructureMissing("html source without rules".into()),
        )
    })?;
    let extractor = HtmlExtractor::new(rules).map_err(|e| parse_error(source, start, e))?;
    let details = rules
        .detail
        .as_ref()
        .map(|d| DetailExtractor::new(d).map(|extractor| (extractor, d.delay())))
        .transpose()
        .map_err(|e| parse_error(source, start, e))?;

    let mut result = Extracted::default();
    let mut visited: HashSet<Url> = HashSet::new();
    let mut next = Some(start.clone());

    while let Some(page) = next.take() {
        if visited.len() >= rules.max_pages.max(1) || !visited.insert(page.clone()) {
            break;
        }
        let first = visited.len() == 1;

        let page_result = match fetcher.fetch(&page).await {
            Ok(body) => {
                let ctx = ExtractContext {
                    source: &source.name,
                    page_url: &page,
                    now,
                    offset,
                };
                extractor
                    .extract(&body, &ctx)
                    .map_err(|e| parse_error(source, &page, e))
            }
            Err(e) => Err(fetch_error(source, &page, e)),
        };

        match page_result {
            Ok(extracted) => {
                tracing::debug!(
                    source = %source.name,
                    url = %page,
                    items = extracted.items.len(),
                    "Scraped listing page"
                );
                result.items.extend(extracted.items);
                result.skipped += extracted.skipped;
                next = extracted.next_page;
            }
            Err(e) if first => return Err(e),
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    url = %page,
                    error = %e,
                    "Stopping pagination"
                );
            }
        }
    }

    if let Some((details, delay)) = &details {
        result.items = follow_details(fetcher, source, details, *delay, result.items, now, offset).await;
    }
    Ok(result)
}

/// Enriches each item from its detail page, one request at a time.
///
/// A detail page that cannot be fetched is logged and the listing record
/// is kept unchanged.
async fn follow_details(
    fetcher: &Fetcher,
    source: &SourceConfig,
    details: &DetailExtractor,
    delay: Duration,
    items: Vec<FeedItem>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<FeedItem> {
    let mut enriched = Vec::with_capacity(items.len());
    for (n, item) in items.into_iter().enumerate() {
        if n > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match fetcher.fetch(&item.link).await {
            Ok(body) => enriched.push(details.extract(&body, offset).apply(item, now, offset)),
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    url = %item.link,
                    error = %e,
                    "Detail page failed, keeping listing record"
                );
                enriched.push(item);
            }
        }
    }
    enriched
}

/// Scrapes all sources and merges the result with the previous output.
pub async fn build(
    config: &Config,
    fetcher: &Fetcher,
    now: DateTime<Utc>,
) -> Result<(FeedDocument, RunReport), RunError> {
    let collected = collect(config, fetcher, now).await?;
    let previous = load_previous(&config.output.path, now).await;

    let fresh = collected.items.len();
    let previous_count = previous.len();
    let document = FeedDocument::assemble(
        config.feed.meta(),
        previous,
        collected.items,
        now,
        config.output.retention(),
    );

    let report = RunReport {
        fresh,
        previous: previous_count,
        published: document.items.len(),
        skipped: collected.skipped,
        failed_attempts: collected.failures,
        path: None,
    };
    Ok((document, report))
}

/// Builds the feed and returns the rendered bytes without writing them.
pub async fn preview(config: &Config, now: DateTime<Utc>) -> Result<(Vec<u8>, RunReport), RunError> {
    let fetcher = Fetcher::from_config(&config.http).map_err(RunError::Client)?;
    let (document, report) = build(config, &fetcher, now).await?;
    let bytes = render(&document, config.output.format)?;
    Ok((bytes, report))
}

/// Runs a full pass and atomically replaces the output file.
///
/// Nothing is written unless every step before it succeeded.
pub async fn run(config: &Config, now: DateTime<Utc>) -> Result<RunReport, RunError> {
    let (bytes, mut report) = preview(config, now).await?;
    write_atomic(&config.output.path, &bytes)?;

    tracing::info!(
        path = %config.output.path.display(),
        items = report.published,
        fresh = report.fresh,
        previous = report.previous,
        "Feed written"
    );
    report.path = Some(config.output.path.clone());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
    }

    fn config_for(server: &MockServer, fail_fast: bool, sources: &str) -> Config {
        let toml = format!(
            r#"
fail_fast = {fail_fast}

[feed]
title = "Jobs"
link = "https://example.com/feed.xml"

[output]
window_days = 0

[http]
max_retries = 0
backoff_base_ms = 1
timeout_secs = 5
allow_private_hosts = true

{sources}
"#,
            fail_fast = fail_fast,
            sources = sources.replace("{base}", &server.uri()),
        );
        Config::from_toml(&toml).unwrap()
    }

    fn fetcher(config: &Config) -> Fetcher {
        Fetcher::from_config(&config.http).unwrap()
    }

    const LISTING_SOURCE: &str = r#"
[[sources]]
name = "Shire"
kind = "html"
starts = ["{base}/jobs"]
[sources.rules]
item = "li.job"
title = "a"
link = "a"
max_pages = 3
"#;

    fn page(items: &[(&str, &str)], next: Option<&str>) -> String {
        let lis: String = items
            .iter()
            .map(|(href, title)| format!(r#"<li class="job"><a href="{}">{}</a></li>"#, href, title))
            .collect();
        let nav = next
            .map(|n| format!(r#"<a rel="next" href="{}">Next</a>"#, n))
            .unwrap_or_default();
        format!("<html><body><ul>{}</ul>{}</body></html>", lis, nav)
    }

    #[tokio::test]
    async fn test_html_pagination_stops_at_visited_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &[("/j/2", "Two")],
                Some("/jobs"),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &[("/j/1", "One")],
                Some("/jobs?page=2"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server, true, LISTING_SOURCE);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();

        let titles: Vec<_> = collected.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert_eq!(collected.attempts, 1);
    }

    #[tokio::test]
    async fn test_pagination_respects_max_pages() {
        let server = MockServer::start().await;
        for n in 1..=5 {
            let href = format!("/j/{}", n);
            let title = format!("Job {}", n);
            let next = format!("/p/{}", n + 1);
            Mock::given(method("GET"))
                .and(path(format!("/p/{}", n)))
                .respond_with(ResponseTemplate::new(200).set_body_string(page(
                    &[(href.as_str(), title.as_str())],
                    Some(next.as_str()),
                )))
                .mount(&server)
                .await;
        }

        let source = r#"
[[sources]]
name = "Shire"
kind = "html"
starts = ["{base}/p/1"]
[sources.rules]
item = "li.job"
max_pages = 2
"#;
        let config = config_for(&server, true, source);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();
        assert_eq!(collected.items.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_later_page_keeps_earlier_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &[("/j/1", "One")],
                Some("/broken"),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = config_for(&server, true, LISTING_SOURCE);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();
        assert_eq!(collected.items.len(), 1);
    }

    #[tokio::test]
    async fn test_detail_pages_enrich_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &[("/j/1", "Parks Lead"), ("/j/2", "Ranger")],
                None,
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/j/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main>
                <p>Location: Kyneton Depot</p>
                <p>Band 6, full time</p>
                <p>Posted: 1 March 2025</p>
                <p>Applications close: 20 March 2025</p>
                </main></body></html>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/j/2"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let source = format!("{}\n[sources.rules.detail]\ndelay_ms = 0\n", LISTING_SOURCE);
        let config = config_for(&server, true, &source);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();
        assert_eq!(collected.items.len(), 2);

        let lead = &collected.items[0];
        assert_eq!(lead.published_at, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(lead.summary, "Location: Kyneton Depot | Full Time | Closes 20 Mar 2025");
        assert_eq!(lead.categories, vec!["Band 6".to_string(), "Full Time".to_string()]);

        let ranger = &collected.items[1];
        assert_eq!(ranger.title, "Ranger");
        assert_eq!(ranger.published_at, now());
        assert_eq!(ranger.summary, "");
        assert!(ranger.categories.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_detail_selector_is_parse_error() {
        let server = MockServer::start().await;
        let source = format!("{}\n[sources.rules.detail]\ncontent = \"div[[\"\n", LISTING_SOURCE);
        let config = config_for(&server, true, &source);
        let err = collect(&config, &fetcher(&config), now()).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Parse { error: ParseError::InvalidSelector { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_on_first_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = config_for(&server, true, LISTING_SOURCE);
        let err = collect(&config, &fetcher(&config), now()).await.unwrap_err();
        match err {
            RunError::Fetch { source_name, .. } => assert_eq!(source_name, "Shire"),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lenient_mode_skips_failed_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><p>down</p></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<rss version="2.0"><channel><title>t</title>
                <item><title>Upstream job</title><link>https://n.example.com/1</link></item>
                </channel></rss>"#,
            ))
            .mount(&server)
            .await;

        let sources = format!(
            "{}\n{}",
            LISTING_SOURCE,
            r#"
[[sources]]
name = "Neighbour"
kind = "feed"
starts = ["{base}/feed.xml"]
"#
        );
        let config = config_for(&server, false, &sources);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();
        assert_eq!(collected.attempts, 2);
        assert_eq!(collected.failures, 1);
        assert_eq!(collected.items.len(), 1);
        assert_eq!(collected.items[0].source, "Neighbour");
    }

    #[tokio::test]
    async fn test_lenient_mode_fails_when_everything_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = config_for(&server, false, LISTING_SOURCE);
        let err = collect(&config, &fetcher(&config), now()).await.unwrap_err();
        assert!(matches!(err, RunError::AllSourcesFailed(1)));
    }

    #[tokio::test]
    async fn test_inactive_sources_are_skipped() {
        let server = MockServer::start().await;
        let source = r#"
[[sources]]
name = "Off"
kind = "feed"
active = false
starts = ["{base}/feed.xml"]
"#;
        let config = config_for(&server, true, source);
        let err = collect(&config, &fetcher(&config), now()).await.unwrap_err();
        assert!(matches!(err, RunError::NoActiveSources));
    }

    #[tokio::test]
    async fn test_pulse_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/WebServices/RCM/Jobs/Jobs"))
            .and(query_param("internalOnly", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Jobs":[{"LinkId":"7","JobInfo":{"Title":"Planner Band 5"}}]}"#,
            ))
            .mount(&server)
            .await;

        let source = r#"
[[sources]]
name = "City"
kind = "pulse_api"
starts = ["{base}/Pulse/jobs"]
"#;
        let config = config_for(&server, true, source);
        let collected = collect(&config, &fetcher(&config), now()).await.unwrap();
        assert_eq!(collected.items.len(), 1);
        let item = &collected.items[0];
        assert_eq!(
            item.link.as_str(),
            format!("{}/Pulse/job/7/Planner-Band-5?source=public", server.uri())
        );
        assert_eq!(item.categories, vec!["Band 5".to_string()]);
    }
}
