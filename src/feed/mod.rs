//! Feed I/O: retrieving sources and reading/writing syndication documents.
//!
//! - [`fetcher`] - HTTP retrieval with timeout, retry/backoff and size limits
//! - [`parser`] - RSS/Atom parsing via `feed-rs` (upstream sources and history)
//! - [`writer`] - RSS 2.0 / Atom 1.0 serialization via `quick-xml`
//! - [`history`] - reading the previously published file back into items
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{render, Fetcher};
//!
//! let bytes = fetcher.fetch(&url).await?;
//! let xml = render(&document, OutputFormat::Rss)?;
//! ```

mod fetcher;
mod history;
mod parser;
mod writer;

pub use fetcher::{FetchError, FetchSettings, Fetcher};
pub use history::load_previous;
pub use parser::{parse_feed, ParsedEntry};
pub use writer::{render, SerializationError, ATOM_ID_PREFIX, SOURCE_SCHEME};
