//! Detail pages: the page a listing item links to.
//!
//! Listing rows rarely carry more than a title and a link. The detail page
//! usually has a block of labelled rows ("Location: Depot",
//! `<dt>Salary</dt><dd>...</dd>`) that [`DetailExtractor`] reads into a
//! [`JobDetail`], which is then folded back into the listing item.

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use super::html::compile;
use super::{classify, parse_lenient, ParseError};
use crate::config::DetailRules;
use crate::model::FeedItem;
use crate::util::{clean_text, truncate_chars};

/// Containers tried, in order, when no content selector is configured.
const CONTENT_FALLBACKS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".container",
    "#content",
    ".job, .job-details, .job-detail",
];

/// Longest labelled value kept.
const MAX_VALUE_CHARS: usize = 120;

static LOCATION: OnceLock<Regex> = OnceLock::new();
static SALARY: OnceLock<Regex> = OnceLock::new();
static POSTED: OnceLock<Regex> = OnceLock::new();
static CLOSING: OnceLock<Regex> = OnceLock::new();

fn label(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("label pattern is valid"))
}

// A label is followed by ':' or '-', or stands alone with the value on the
// next line.
fn location_re() -> &'static Regex {
    label(&LOCATION, r"(?i)^(?:(?:work\s*)?location|based\s+at)\b\s*(?:[:\-]\s*|$)")
}

fn salary_re() -> &'static Regex {
    label(&SALARY, r"(?i)^(?:salary|remuneration|package)(?:\s+range)?\b\s*(?:[:\-]\s*|$)")
}

fn posted_re() -> &'static Regex {
    label(
        &POSTED,
        r"(?i)^(?:date\s+)?(?:posted|advertised)(?:\s+on)?(?:\s+date)?\b\s*(?:[:\-]\s*|$)",
    )
}

fn closing_re() -> &'static Regex {
    label(
        &CLOSING,
        r"(?i)^(?:applications?\s+close|closing(?:\s+date)?|closes)(?:\s+on)?\b\s*(?:[:\-]\s*|$)",
    )
}

/// Facts mined from one detail page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDetail {
    pub location: Option<String>,
    pub salary: Option<String>,
    pub employment_type: Option<&'static str>,
    pub band: Option<String>,
    pub posted: Option<DateTime<Utc>>,
    pub closing: Option<DateTime<Utc>>,
}

impl JobDetail {
    /// Folds the facts into a listing item.
    ///
    /// An item still stamped with the run time takes the posted date.
    /// Location, salary, employment type and closing date are appended to
    /// the summary; band and employment type become categories.
    pub fn apply(&self, mut item: FeedItem, now: DateTime<Utc>, offset: FixedOffset) -> FeedItem {
        if item.published_at == now {
            if let Some(posted) = self.posted {
                item.published_at = posted;
            }
        }

        let facts: Vec<String> = [
            self.location.as_ref().map(|l| format!("Location: {}", l)),
            self.salary.as_ref().map(|s| format!("Salary: {}", s)),
            self.employment_type.map(str::to_string),
            self.closing
                .map(|d| format!("Closes {}", d.with_timezone(&offset).format("%-d %b %Y"))),
        ]
        .into_iter()
        .flatten()
        .collect();

        if !facts.is_empty() {
            let summary = Some(item.summary.clone())
                .filter(|s| !s.is_empty())
                .into_iter()
                .chain(facts)
                .collect::<Vec<_>>()
                .join(" | ");
            item = item.with_summary(&summary);
        }

        for category in self.band.as_deref().into_iter().chain(self.employment_type) {
            item = item.with_category(category);
        }
        item
    }
}

/// Reads [`JobDetail`]s out of detail pages.
#[derive(Debug)]
pub struct DetailExtractor {
    content: Option<Selector>,
    fallbacks: Vec<Selector>,
}

fn has_text(el: &ElementRef<'_>) -> bool {
    el.text().any(|t| !t.trim().is_empty())
}

/// Value after a label on the same line, or the whole next line when the
/// label stands alone.
fn labelled<'a>(lines: &'a [String], label: &Regex) -> Option<&'a str> {
    lines.iter().enumerate().find_map(|(n, line)| {
        let end = label.find(line)?.end();
        match line[end..].trim() {
            "" => lines.get(n + 1).map(String::as_str),
            value => Some(value),
        }
    })
}

impl DetailExtractor {
    pub fn new(rules: &DetailRules) -> Result<Self, ParseError> {
        Ok(Self {
            content: rules.content.as_deref().map(compile).transpose()?,
            fallbacks: CONTENT_FALLBACKS
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
        })
    }

    fn content_node<'a>(&self, doc: &'a Html) -> ElementRef<'a> {
        self.content
            .iter()
            .chain(&self.fallbacks)
            .find_map(|sel| doc.select(sel).find(has_text))
            .unwrap_or_else(|| doc.root_element())
    }

    /// Mines a detail page. Never fails: a page without recognizable rows
    /// yields an empty [`JobDetail`].
    pub fn extract(&self, content: &[u8], offset: FixedOffset) -> JobDetail {
        let html = String::from_utf8_lossy(content);
        let doc = Html::parse_document(&html);
        let lines: Vec<String> = self
            .content_node(&doc)
            .text()
            .map(clean_text)
            .filter(|line| !line.is_empty())
            .collect();
        let blob = lines.join(" ");

        let value = |label: &Regex| {
            labelled(&lines, label).map(|v| truncate_chars(v, MAX_VALUE_CHARS).into_owned())
        };
        let date = |label: &Regex| labelled(&lines, label).and_then(|v| parse_lenient(v, offset));

        JobDetail {
            location: value(location_re()),
            salary: value(salary_re()).or_else(|| classify::guess_salary(&blob)),
            employment_type: classify::guess_employment_type(&blob),
            band: classify::guess_band(&blob),
            posted: date(posted_re()),
            closing: date(closing_re()),
        }
    }
}
