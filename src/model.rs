//! Feed data model: normalized items and the document written each run.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::util::{clean_text, xml_safe};

/// A single normalized entry, whatever source it was scraped from.
///
/// `title`, `link` and `unique_id` are never empty; constructors refuse
/// records that would violate that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: Url,
    pub published_at: DateTime<Utc>,
    /// Plain text or HTML; empty when the source had nothing to offer.
    pub summary: String,
    /// Stable across runs for the same logical item. See [`item_id`].
    pub unique_id: String,
    pub categories: Vec<String>,
    /// Name of the configured source this item came from.
    pub source: String,
}

impl FeedItem {
    /// Builds an item with a derived `unique_id`.
    ///
    /// Returns `None` when the title is blank after whitespace cleanup.
    pub fn new(source: &str, title: &str, link: Url, published_at: DateTime<Utc>) -> Option<Self> {
        let title = clean_text(title);
        if title.is_empty() {
            return None;
        }
        let unique_id = item_id(source, &link);
        Some(Self {
            title,
            link,
            published_at,
            summary: String::new(),
            unique_id,
            categories: Vec::new(),
            source: source.to_owned(),
        })
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = xml_safe(summary).trim().to_owned();
        self
    }

    /// Adds a category, ignoring blanks and duplicates.
    pub fn with_category(mut self, category: &str) -> Self {
        let category = clean_text(category);
        if !category.is_empty() && !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    /// Replaces the derived id with one carried over from a previous run.
    pub fn with_unique_id(mut self, unique_id: &str) -> Self {
        let trimmed = unique_id.trim();
        if !trimmed.is_empty() {
            self.unique_id = trimmed.to_owned();
        }
        self
    }
}

/// Derives the stable identifier for an item: SHA-256 of `source|link`.
pub fn item_id(source: &str, link: &Url) -> String {
    let input = format!("{}|{}", source, link);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Channel-level metadata, taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
}

/// How much history a document keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Drop items published more than this many days before the build.
    /// Zero keeps everything.
    pub window_days: u32,
    pub max_items: usize,
}

/// The complete feed produced by one run.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub meta: FeedMeta,
    pub last_build: DateTime<Utc>,
    /// Newest first. Ties are ordered by `unique_id`.
    pub items: Vec<FeedItem>,
}

impl FeedDocument {
    /// Builds a document from items in any order.
    pub fn new(meta: FeedMeta, last_build: DateTime<Utc>, mut items: Vec<FeedItem>) -> Self {
        sort_newest_first(&mut items);
        Self {
            meta,
            last_build,
            items,
        }
    }

    /// Merges this run's items with those read back from the previous output.
    ///
    /// - the first fresh occurrence of a `unique_id` wins over later ones
    /// - a fresh item replaces the previous one with the same id; when the
    ///   fresh item is undated (stamped with `now`) the previous
    ///   `published_at` is kept, so first-seen dates survive runs
    /// - items outside the retention window are dropped, then the list is
    ///   sorted and capped at `max_items`
    pub fn assemble(
        meta: FeedMeta,
        previous: Vec<FeedItem>,
        fresh: Vec<FeedItem>,
        now: DateTime<Utc>,
        policy: RetentionPolicy,
    ) -> Self {
        let mut merged: HashMap<String, FeedItem> =
            HashMap::with_capacity(previous.len() + fresh.len());
        for item in previous {
            merged.entry(item.unique_id.clone()).or_insert(item);
        }

        let mut seen = HashSet::with_capacity(fresh.len());
        for item in fresh {
            if !seen.insert(item.unique_id.clone()) {
                continue;
            }
            // Undated items are stamped with `now`; those keep the date the
            // previous run gave them.
            let item = match merged.remove(&item.unique_id) {
                Some(prev) if item.published_at == now => FeedItem {
                    published_at: prev.published_at.min(now),
                    ..item
                },
                _ => item,
            };
            merged.insert(item.unique_id.clone(), item);
        }

        let cutoff = (policy.window_days > 0)
            .then(|| Duration::try_days(i64::from(policy.window_days)))
            .flatten()
            .and_then(|window| now.checked_sub_signed(window));

        let mut items: Vec<FeedItem> = merged
            .into_values()
            .filter(|item| cutoff.map_or(true, |c| item.published_at >= c))
            .collect();
        sort_newest_first(&mut items);
        items.truncate(policy.max_items);

        Self {
            meta,
            last_build: now,
            items,
        }
    }
}

fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.unique_id.cmp(&b.unique_id))
    });
}
