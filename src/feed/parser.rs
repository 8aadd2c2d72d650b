use chrono::{DateTime, Utc};
use feed_rs::parser;
use url::Url;

/// An RSS/Atom entry reduced to the fields a [`FeedItem`](crate::model::FeedItem) needs.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    /// The entry's `guid`/`id`, empty when the document had none.
    pub guid: String,
    /// `None` when the entry has no title or only whitespace.
    pub title: Option<String>,
    pub link: Option<Url>,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// `(term, scheme)` pairs; RSS `domain` attributes arrive as the scheme.
    pub categories: Vec<(String, Option<String>)>,
}

/// Parses RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedEntry>, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
                .or_else(|| entry.links.first())
                .and_then(|l| Url::parse(l.href.trim()).ok());
            let published = entry.published.or(entry.updated);
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry
                .title
                .map(|t| t.content)
                .filter(|t| !t.trim().is_empty());
            let categories = entry
                .categories
                .into_iter()
                .map(|c| (c.term, c.scheme))
                .collect();

            ParsedEntry {
                guid: entry.id.trim().to_string(),
                title,
                link,
                published,
                summary,
                categories,
            }
        })
        .collect();

    Ok(entries)
}
