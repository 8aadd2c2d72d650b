use super::{ExtractContext, Extracted, Extractor, ParseError};
use crate::feed::parse_feed;
use crate::model::FeedItem;

/// Re-publishes entries of an existing RSS/Atom feed under a source name.
#[derive(Debug, Default)]
pub struct UpstreamExtractor;

impl UpstreamExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for UpstreamExtractor {
    fn extract(&self, content: &[u8], ctx: &ExtractContext<'_>) -> Result<Extracted, ParseError> {
        let entries = parse_feed(content).map_err(|e| ParseError::Feed(e.to_string()))?;

        let mut extracted = Extracted::default();
        for entry in entries {
            let published = entry.published.unwrap_or(ctx.now);
            let item = entry
                .link
                .zip(entry.title.as_deref())
                .and_then(|(link, title)| FeedItem::new(ctx.source, title, link, published));
            let Some(mut item) = item else {
                extracted.skipped += 1;
                continue;
            };

            if let Some(summary) = entry.summary.as_deref() {
                item = item.with_summary(summary);
            }
            for (term, _) in &entry.categories {
                item = item.with_category(term);
            }
            extracted.items.push(item);
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use url::Url;

    #[test]
    fn test_extract_upstream_rss() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Neighbour</title>
  <item>
    <title>Arborist</title>
    <link>https://neighbour.example.com/jobs/1</link>
    <pubDate>Mon, 03 Mar 2025 09:00:00 GMT</pubDate>
    <description>Outdoor role</description>
    <category>Casual</category>
  </item>
  <item>
    <title>Undated</title>
    <link>https://neighbour.example.com/jobs/2</link>
  </item>
  <item>
    <title>Linkless</title>
  </item>
  <item>
    <link>https://neighbour.example.com/jobs/3</link>
    <description>Title went missing upstream</description>
  </item>
</channel></rss>"#;

        let page = Url::parse("https://neighbour.example.com/feed.xml").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap();
        let ctx = ExtractContext {
            source: "Neighbour",
            page_url: &page,
            now,
            offset: FixedOffset::east_opt(0).unwrap(),
        };

        let out = UpstreamExtractor::new().extract(rss.as_bytes(), &ctx).unwrap();
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.skipped, 2);
        assert!(out.items.iter().all(|i| i.title != "Untitled"));

        let first = &out.items[0];
        assert_eq!(first.title, "Arborist");
        assert_eq!(first.summary, "Outdoor role");
        assert_eq!(first.categories, vec!["Casual".to_string()]);
        assert_eq!(first.source, "Neighbour");
        assert_eq!(first.published_at, Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap());
        assert_eq!(out.items[1].published_at, now);
    }

    #[test]
    fn test_non_feed_is_parse_error() {
        let page = Url::parse("https://example.com/").unwrap();
        let ctx = ExtractContext {
            source: "x",
            page_url: &page,
            now: Utc::now(),
            offset: FixedOffset::east_opt(0).unwrap(),
        };
        let result = UpstreamExtractor::new().extract(b"<html><body/></html>", &ctx);
        assert!(matches!(result, Err(ParseError::Feed(_))));
    }
}
