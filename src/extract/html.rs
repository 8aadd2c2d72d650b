use scraper::{ElementRef, Html, Selector};

use super::{classify, parse_lenient, resolve_link, ExtractContext, Extracted, Extractor, ParseError};
use crate::config::HtmlRules;
use crate::model::FeedItem;
use crate::util::clean_text;

/// Link labels treated as "next page" when no selector is configured.
const NEXT_LABELS: &[&str] = &["next", "next page", "older", "more jobs", "›", "»"];

/// Listing-page scraper driven by [`HtmlRules`].
///
/// Selectors are compiled once per source. `title` and `link` default to
/// the item node itself; the link is read from the matched element's `href`
/// or, failing that, from its first `a[href]` descendant.
#[derive(Debug)]
pub struct HtmlExtractor {
    item: Selector,
    title: Option<Selector>,
    link: Option<Selector>,
    published: Option<Selector>,
    summary: Option<Selector>,
    next_page: Option<Selector>,
    anchor: Selector,
    rel_next: Selector,
    classify: bool,
}

pub(super) fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn compile_opt(selector: Option<&String>) -> Result<Option<Selector>, ParseError> {
    selector.map(|s| compile(s)).transpose()
}

fn text_of(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

impl HtmlExtractor {
    pub fn new(rules: &HtmlRules) -> Result<Self, ParseError> {
        Ok(Self {
            item: compile(&rules.item)?,
            title: compile_opt(rules.title.as_ref())?,
            link: compile_opt(rules.link.as_ref())?,
            published: compile_opt(rules.published.as_ref())?,
            summary: compile_opt(rules.summary.as_ref())?,
            next_page: compile_opt(rules.next_page.as_ref())?,
            anchor: compile("a[href]")?,
            rel_next: compile("a[rel~=next][href], link[rel~=next][href]")?,
            classify: rules.classify,
        })
    }

    fn href_of<'a>(&self, el: ElementRef<'a>) -> Option<&'a str> {
        el.value()
            .attr("href")
            .or_else(|| el.select(&self.anchor).next().and_then(|a| a.value().attr("href")))
    }

    fn find_next_page(&self, doc: &Html, ctx: &ExtractContext<'_>) -> Option<url::Url> {
        let href = match &self.next_page {
            Some(sel) => doc.select(sel).next().and_then(|el| self.href_of(el)),
            None => doc
                .select(&self.rel_next)
                .next()
                .and_then(|el| el.value().attr("href"))
                .or_else(|| {
                    doc.select(&self.anchor)
                        .find(|a| NEXT_LABELS.contains(&text_of(*a).to_lowercase().as_str()))
                        .and_then(|a| a.value().attr("href"))
                }),
        }?;
        resolve_link(ctx.page_url, href).filter(|next| next != ctx.page_url)
    }

    fn item_from(&self, node: ElementRef<'_>, ctx: &ExtractContext<'_>) -> Option<FeedItem> {
        let title = match &self.title {
            Some(sel) => node.select(sel).next().map(text_of)?,
            None => text_of(node),
        };

        let link_el = match &self.link {
            Some(sel) => node.select(sel).next()?,
            None => node,
        };
        let link = resolve_link(ctx.page_url, self.href_of(link_el)?)?;

        let published = self
            .published
            .as_ref()
            .and_then(|sel| node.select(sel).next())
            .and_then(|el| {
                el.value()
                    .attr("datetime")
                    .and_then(|dt| parse_lenient(dt, ctx.offset))
                    .or_else(|| parse_lenient(&text_of(el), ctx.offset))
            })
            .unwrap_or(ctx.now);

        let summary = self
            .summary
            .as_ref()
            .and_then(|sel| node.select(sel).next())
            .map(text_of)
            .unwrap_or_default();

        let mut item = FeedItem::new(ctx.source, &title, link, published)?.with_summary(&summary);
        if self.classify {
            for category in classify::categories_for(&text_of(node)) {
                item = item.with_category(&category);
            }
        }
        Some(item)
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, content: &[u8], ctx: &ExtractContext<'_>) -> Result<Extracted, ParseError> {
        let html = String::from_utf8_lossy(content);
        let doc = Html::parse_document(&html);

        let mut matched = 0;
        let mut extracted = Extracted::default();
        for node in doc.select(&self.item) {
            matched += 1;
            match self.item_from(node, ctx) {
                Some(item) => extracted.items.push(item),
                None => extracted.skipped += 1,
            }
        }

        if matched == 0 {
            return Err(ParseError::StructureMissing(format!(
                "no elements match the item selector on {}",
                ctx.page_url
            )));
        }

        if extracted.skipped > 0 {
            tracing::warn!(
                source = %ctx.source,
                url = %ctx.page_url,
                skipped = extracted.skipped,
                "Listing entries without a title or link were skipped"
            );
        }

        extracted.next_page = self.find_next_page(&doc, ctx);
        Ok(extracted)
    }
}
