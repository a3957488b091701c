use kassa_core::Source;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure. The request URL is stripped because Poster carries
    /// its token in the query string.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("{feed} API returned status {status}: {body}")]
    Status {
        feed: Source,
        status: u16,
        body: String,
    },
    #[error("Failed to decode {feed} response: {err}")]
    Decode {
        feed: Source,
        #[source]
        err: serde_json::Error,
    },
    #[error("{feed} API error: {message}")]
    Api { feed: Source, message: String },
    #[error("Invalid {feed} configuration: {message}")]
    Config { feed: Source, message: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Http(e.without_url())
    }
}

/// Why a single raw record was dropped.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unexpected record shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("missing transaction id")]
    MissingId,
    #[error("unparseable amount '{0}'")]
    InvalidAmount(String),
}
