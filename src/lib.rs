//! feedforge scrapes job listing pages, JSON APIs and upstream feeds into a
//! single static RSS 2.0 or Atom 1.0 file.
//!
//! A run is a single pass: load [`config::Config`], scrape every active
//! source ([`pipeline::collect`]), merge with the previously published file
//! ([`model::FeedDocument::assemble`]) and atomically replace it
//! ([`output::write_atomic`]). The published file is the only state kept
//! between runs.

pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod util;

pub use config::{Config, OutputFormat};
pub use error::RunError;
pub use model::{FeedDocument, FeedItem};
