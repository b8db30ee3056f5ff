//! Error types for bookref-core.
//!
//! Only [`PipelineError`] ever escapes a run. The other types are turned
//! into terminal statuses on the record of the entity they belong to.

use std::path::PathBuf;

use thiserror::Error;

use crate::contract::ContentKind;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("document could not be opened: {0}")]
    Open(String),

    #[error("text extraction failed on page {page}: {message}")]
    PageText { page: usize, message: String },

    #[error("document could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("no page model for {0} documents")]
    Unsupported(ContentKind),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("catalog has no '{0}' column")]
    MissingColumn(String),

    #[error("catalog download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no catalog download link on {0}")]
    LinkNotFound(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("content store {path:?} could not be created: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
