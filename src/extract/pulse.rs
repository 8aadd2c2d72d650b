//! Pulse recruitment portals expose their listings as JSON under
//! `{root}/WebServices/RCM/Jobs/Jobs`, where `root` is everything in the
//! public start URL before `/Pulse`.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{classify, ExtractContext, Extracted, Extractor, ParseError};
use crate::model::FeedItem;
use crate::util::clean_text;

const JOBS_PATH: [&str; 4] = ["WebServices", "RCM", "Jobs", "Jobs"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobsResponse {
    jobs: Option<Vec<JobRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobRow {
    #[serde(default)]
    link_id: Value,
    #[serde(default)]
    job_info: Option<JobInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct JobInfo {
    title: Option<String>,
    compensation: Option<String>,
    closing_date: Option<String>,
    location: Option<String>,
    employment_type: Option<String>,
    work_arrangement: Option<String>,
    department: Option<String>,
}

#[derive(Debug, Default)]
pub struct PulseExtractor;

impl PulseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Portal root: the start URL up to (not including) `/Pulse`.
    pub fn root(start: &Url) -> Result<Url, ParseError> {
        let raw = start.as_str();
        let root = raw.split("/Pulse").next().unwrap_or(raw).trim_end_matches('/');
        Url::parse(root).map_err(|_| ParseError::BadSourceUrl(raw.to_string()))
    }

    /// The JSON endpoint to request for a portal start URL.
    pub fn api_url(start: &Url) -> Result<Url, ParseError> {
        let mut url = Self::root(start)?;
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ParseError::BadSourceUrl(start.to_string()))?
            .pop_if_empty()
            .extend(JOBS_PATH);
        Ok(url)
    }

    pub fn query() -> [(&'static str, &'static str); 3] {
        [
            ("internalOnly", "false"),
            ("workArrangement", ""),
            ("employmentType", ""),
        ]
    }

    pub fn headers(start: &Url) -> Result<HeaderMap, ParseError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let referer = HeaderValue::from_str(start.as_str())
            .map_err(|_| ParseError::BadSourceUrl(start.to_string()))?;
        headers.insert(REFERER, referer);
        Ok(headers)
    }

    fn detail_link(root: &Url, link_id: &str, title: &str) -> Option<Url> {
        let slug = title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .replace('/', "-")
            .replace('&', "and");

        let mut link = root.clone();
        link.set_fragment(None);
        link.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["Pulse", "job", link_id, &slug]);
        link.set_query(Some("source=public"));
        Some(link)
    }
}

fn link_id_of(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn summary_of(info: &JobInfo) -> String {
    let field = |value: &Option<String>| value.as_deref().map(clean_text).filter(|s| !s.is_empty());

    let mut parts = Vec::new();
    parts.extend(field(&info.location));
    parts.extend(field(&info.compensation));
    parts.extend(field(&info.employment_type));
    parts.extend(field(&info.work_arrangement));
    parts.extend(field(&info.department));
    if let Some(closing) = field(&info.closing_date) {
        parts.push(format!("Closes {}", closing));
    }
    parts.join(" | ")
}

impl Extractor for PulseExtractor {
    /// `ctx.page_url` is the portal start URL, not the API endpoint.
    fn extract(&self, content: &[u8], ctx: &ExtractContext<'_>) -> Result<Extracted, ParseError> {
        let response: JobsResponse = serde_json::from_slice(content)?;
        let rows = response
            .jobs
            .ok_or_else(|| ParseError::StructureMissing(format!("no Jobs key for {}", ctx.page_url)))?;
        let root = Self::root(ctx.page_url)?;

        let mut extracted = Extracted::default();
        for row in rows {
            let info = row.job_info.unwrap_or_default();
            let title = clean_text(info.title.as_deref().unwrap_or_default());

            let item = link_id_of(&row.link_id)
                .and_then(|id| Self::detail_link(&root, &id, &title))
                .and_then(|link| FeedItem::new(ctx.source, &title, link, ctx.now));

            match item {
                Some(mut item) => {
                    item = item.with_summary(&summary_of(&info));
                    if let Some(band) = classify::guess_band(&title) {
                        item = item.with_category(&band);
                    }
                    if let Some(kind) = info.employment_type.as_deref() {
                        item = item.with_category(kind);
                    }
                    extracted.items.push(item);
                }
                None => extracted.skipped += 1,
            }
        }

        tracing::debug!(
            source = %ctx.source,
            items = extracted.items.len(),
            skipped = extracted.skipped,
            "Pulse listings parsed"
        );
        Ok(extracted)
    }
}
