//! Turning fetched content into normalized [`FeedItem`]s.
//!
//! One [`Extractor`] per source kind:
//!
//! - [`HtmlExtractor`] - listing pages scraped with configured CSS selectors
//! - [`PulseExtractor`] - the Pulse recruitment JSON API
//! - [`UpstreamExtractor`] - existing RSS/Atom feeds
//!
//! [`DetailExtractor`] is the odd one out: it reads the page an `html`
//! item links to and enriches the item instead of producing new ones.
//!
//! Extractors are pure: they never fetch. Records missing a required field
//! (title or link) are skipped and counted rather than emitted half-empty.

pub mod classify;
mod dates;
mod detail;
mod html;
mod pulse;
mod upstream;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use url::Url;

use crate::model::FeedItem;

pub use dates::parse_lenient;
pub use detail::{DetailExtractor, JobDetail};
pub use html::HtmlExtractor;
pub use pulse::PulseExtractor;
pub use upstream::UpstreamExtractor;

/// Errors raised when content does not have the expected structure.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The selector or key that identifies items matched nothing.
    #[error("expected structure not found: {0}")]
    StructureMissing(String),

    /// A configured CSS selector does not parse.
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not an RSS/Atom feed: {0}")]
    Feed(String),

    /// The source URL cannot be turned into the URL to request.
    #[error("cannot derive request URL from '{0}'")]
    BadSourceUrl(String),
}

/// Where the content came from and how to fill in missing values.
#[derive(Debug, Clone)]
pub struct ExtractContext<'a> {
    /// Configured source name; part of every item's `unique_id`.
    pub source: &'a str,
    /// URL the content was fetched for; relative links resolve against it.
    pub page_url: &'a Url,
    /// Stamped on items whose date could not be scraped.
    pub now: DateTime<Utc>,
    /// Zone for dates that carry none.
    pub offset: FixedOffset,
}

/// What one page of content yielded.
#[derive(Debug, Default)]
pub struct Extracted {
    pub items: Vec<FeedItem>,
    /// Records dropped for a missing title or unusable link.
    pub skipped: usize,
    /// Next listing page, for paginated sources.
    pub next_page: Option<Url>,
}

pub trait Extractor {
    fn extract(&self, content: &[u8], ctx: &ExtractContext<'_>) -> Result<Extracted, ParseError>;
}

/// Resolves `href` against `base`, keeping only http(s) targets.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
