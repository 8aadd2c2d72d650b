//! Configuration file parser for `feedforge.toml`.
//!
//! Every section uses `#[serde(default)]` so a config only has to name its
//! sources. Unknown top-level keys are accepted but logged as warnings, since
//! they are usually typos.
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::model::{FeedMeta, RetentionPolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed fine but describes something that cannot run.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Abort the whole run on the first failing source (default). When off,
    /// failing sources are logged and skipped.
    pub fail_fast: bool,
    pub feed: FeedConfig,
    pub output: OutputConfig,
    pub http: HttpConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fail_fast: true,
            feed: FeedConfig::default(),
            output: OutputConfig::default(),
            http: HttpConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// Channel metadata written into every document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    /// Offset applied to scraped dates that carry no timezone.
    pub utc_offset_hours: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            title: "feedforge".to_string(),
            link: "https://example.com/feed.xml".to_string(),
            description: "Automatically updated feed.".to_string(),
            language: "en".to_string(),
            utc_offset_hours: 0,
        }
    }
}

impl FeedConfig {
    pub fn meta(&self) -> FeedMeta {
        FeedMeta {
            title: self.title.clone(),
            link: self.link.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
        }
    }

    /// Timezone for naive scraped dates. Out-of-range offsets fall back to UTC
    /// (validation rejects them before a run starts).
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

/// Syndication format of the output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Rss,
    Atom,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub max_items: usize,
    /// Only keep items published within this many days. 0 = no limit.
    pub window_days: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("feeds/feed.xml"),
            format: OutputFormat::Rss,
            max_items: 300,
            window_days: 45,
        }
    }
}

impl OutputConfig {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            window_days: self.window_days,
            max_items: self.max_items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_body_bytes: usize,
    /// Permit localhost and private network hosts (intranet portals, tests).
    pub allow_private_hosts: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("feedforge/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 1000,
            max_body_bytes: 10 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// How a source's content is turned into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Listing page scraped with CSS selectors.
    Html,
    /// Pulse recruitment portal JSON API.
    PulseApi,
    /// An existing RSS/Atom feed.
    Feed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub starts: Vec<String>,
    #[serde(default)]
    pub rules: Option<HtmlRules>,
}

impl SourceConfig {
    /// Parses the start URLs in listed order.
    pub fn start_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.starts
            .iter()
            .map(|s| {
                Url::parse(s).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "source '{}' has invalid start URL '{}': {}",
                        self.name, s, e
                    ))
                })
            })
            .collect()
    }
}

/// CSS selectors for an `html` source.
///
/// `item` selects one node per listing entry; the other selectors are
/// evaluated inside it. Unset `title`/`link` fall back to the item node.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlRules {
    pub item: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Anchor to the next listing page. Defaults to `a[rel=next]` and
    /// "Next"-labelled links.
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Derive band and employment-type categories from the item text.
    #[serde(default)]
    pub classify: bool,
    /// Follow each item link and mine its detail page.
    #[serde(default)]
    pub detail: Option<DetailRules>,
}

/// Detail-page scraping for an `html` source.
///
/// Location, salary, employment type, band and posted/closing dates are
/// read from labelled rows ("Location: Depot", `<dt>Salary</dt><dd>..</dd>`)
/// inside the content node. A detail page that fails to load leaves the
/// listing record as it was.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailRules {
    /// Node holding the job details. Defaults to the first non-empty
    /// `main`, `article` or common job-detail container.
    pub content: Option<String>,
    /// Pause between detail requests.
    pub delay_ms: u64,
}

impl Default for DetailRules {
    fn default() -> Self {
        Self {
            content: None,
            delay_ms: 500,
        }
    }
}

impl DetailRules {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> usize {
    5
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Upper bound for `output.window_days` (a century).
    const MAX_WINDOW_DAYS: u32 = 36_500;

    const KNOWN_KEYS: [&'static str; 5] = ["fail_fast", "feed", "output", "http", "sources"];

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::NotFound)`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            output = %config.output.path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that parse but cannot produce a feed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no [[sources]] configured".into()));
        }
        if self.output.max_items == 0 {
            return Err(ConfigError::Invalid("output.max_items must be > 0".into()));
        }
        if self.output.window_days > Self::MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid(format!(
                "output.window_days must be at most {} (0 disables the window)",
                Self::MAX_WINDOW_DAYS
            )));
        }
        if !(-23..=23).contains(&self.feed.utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "feed.utc_offset_hours out of range: {}",
                self.feed.utc_offset_hours
            )));
        }
        if self.feed.title.trim().is_empty() || self.feed.link.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "feed.title and feed.link must not be empty".into(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Invalid("source with empty name".into()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if source.kind == SourceKind::Html && source.rules.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "html source '{}' needs a [sources.rules] table",
                    source.name
                )));
            }
            if source.active && source.starts.is_empty() {
                tracing::warn!(source = %source.name, "Active source has no start URLs");
            }
            source.start_urls()?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
