//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: refusing non-HTTP schemes and internal hosts before a fetch
//! - **Text processing**: whitespace cleanup, XML-safe filtering, truncation
//!
//! # Examples
//!
//! ```
//! use feedforge::util::{check_url, clean_text};
//! use url::Url;
//!
//! let url = Url::parse("https://example.com/careers").unwrap();
//! assert!(check_url(&url, false).is_ok());
//!
//! assert_eq!(clean_text("  Graduate\n  Engineer "), "Graduate Engineer");
//! ```

mod text;
mod url_validator;

pub use text::{clean_text, truncate_chars, xml_safe};
pub use url_validator::{check_url, UrlValidationError};

/// Maximum summary length written to the feed, in characters.
pub const MAX_SUMMARY_CHARS: usize = 4000;
