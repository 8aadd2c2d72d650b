use thiserror::Error;
use url::Url;

use crate::config::ConfigError;
use crate::extract::ParseError;
use crate::feed::{FetchError, SerializationError};
use crate::output::OutputError;

/// Why a run ended without publishing.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to fetch {url} for '{source_name}': {error}")]
    Fetch {
        source_name: String,
        url: Url,
        #[source]
        error: FetchError,
    },

    #[error("failed to parse {url} for '{source_name}': {error}")]
    Parse {
        source_name: String,
        url: Url,
        #[source]
        error: ParseError,
    },

    #[error("failed to render feed: {0}")]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("all {0} source requests failed; keeping the previous feed")]
    AllSourcesFailed(usize),

    #[error("no active sources configured")]
    NoActiveSources,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
