//! Error types for the tracker library.
//!
//! Per-entity problems in a feed are never errors (see [`crate::report`]);
//! everything here is something a caller has to handle or log.

use thiserror::Error;

/// Failures talking to the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached, or a session/transaction could not be opened.
    #[error("store unreachable")]
    Connectivity(#[source] sqlx::Error),

    /// The upsert transaction failed and was rolled back; no row changed.
    #[error("upsert transaction failed, batch rolled back")]
    Transaction(#[source] sqlx::Error),

    /// Marking missing vehicles inactive failed after the upsert committed.
    #[error("failed to mark missing vehicles inactive")]
    Deactivation(#[source] sqlx::Error),

    #[error("failed to purge stale vehicle rows")]
    Purge(#[source] sqlx::Error),

    #[error("database migration failed")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Failures retrieving the raw feed bytes.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid feed url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid auth {field} for feed: {message}")]
    InvalidAuth {
        field: &'static str,
        message: String,
    },

    #[error("feed request failed")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("feed returned an empty body")]
    EmptyBody,

    #[error("failed to read feed file")]
    Io(#[from] std::io::Error),
}

/// Failures of a single pull. Decode failures are not here: they recover to an
/// empty batch and are reported in the pull summary.
#[derive(Error, Debug)]
pub enum PullError {
    #[error("a pull is already in flight")]
    Overlapping,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
