//! Error types for the upstream feeds.

use thiserror::Error;

/// Why a feed produced no update this cycle.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("unexpected payload: {0}")]
    Decode(String),

    /// The markup page did not contain what we look for.  Expected while a
    /// mount is down, so it is reported as a warning rather than an error.
    #[error("extraction miss: {0}")]
    ExtractionMiss(String),
}

impl FeedError {
    pub fn is_extraction_miss(&self) -> bool {
        matches!(self, FeedError::ExtractionMiss(_))
    }

    /// Log at the level the failure kind calls for.
    pub fn report(&self, feed: &str) {
        if self.is_extraction_miss() {
            tracing::warn!("{}: {}", feed, self);
        } else {
            tracing::error!("{}: {}", feed, self);
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
