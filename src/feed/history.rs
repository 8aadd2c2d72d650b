use chrono::{DateTime, Utc};
use std::path::Path;

use crate::feed::parser::{parse_feed, ParsedEntry};
use crate::feed::writer::{ATOM_ID_PREFIX, SOURCE_SCHEME};
use crate::model::FeedItem;

/// Reads the previously published feed back into items.
///
/// This is the only state carried between runs. A missing file yields an
/// empty history; an unreadable or unparsable one is logged and treated as
/// empty, so the run regenerates the feed from scratch instead of failing.
/// Entries without a usable link are dropped.
///
/// `now` stands in for entries that lost their date.
pub async fn load_previous(path: &Path, now: DateTime<Utc>) -> Vec<FeedItem> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No previous feed, starting fresh");
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read previous feed, ignoring it");
            return Vec::new();
        }
    };

    let entries = match parse_feed(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Previous feed is not valid RSS/Atom, ignoring it");
            return Vec::new();
        }
    };

    let total = entries.len();
    let items: Vec<FeedItem> = entries
        .into_iter()
        .filter_map(|entry| restore(entry, now))
        .collect();

    if items.len() < total {
        tracing::warn!(
            path = %path.display(),
            dropped = total - items.len(),
            "Previous feed entries without a usable link were dropped"
        );
    }
    tracing::debug!(path = %path.display(), items = items.len(), "Loaded previous feed");
    items
}

fn restore(entry: ParsedEntry, now: DateTime<Utc>) -> Option<FeedItem> {
    let link = entry.link?;

    let mut source = String::new();
    let mut categories = Vec::new();
    for (term, scheme) in entry.categories {
        if scheme.as_deref() == Some(SOURCE_SCHEME) {
            source = term;
        } else {
            categories.push(term);
        }
    }

    let guid = entry
        .guid
        .strip_prefix(ATOM_ID_PREFIX)
        .unwrap_or(&entry.guid)
        .to_string();

    let title = entry.title.as_deref()?;
    let mut item = FeedItem::new(&source, title, link, entry.published.unwrap_or(now))?
        .with_summary(entry.summary.as_deref().unwrap_or(""))
        .with_unique_id(&guid);
    for category in &categories {
        item = item.with_category(category);
    }
    Some(item)
}
