//! Error taxonomy shared by image sources and the two background pipelines.
//!
//! Per-item failures (`Decode`, `Fetch`) never abort a pipeline; they are logged
//! and the item falls back to a placeholder. Only whole-collection failures
//! (`SourceUnavailable`) are returned to the caller of a collection load.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing file, directory or archive, or one that holds no loadable images
    #[error("{reason}: '{}'", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The bytes were read but are not a decodable image
    #[error("failed to decode '{}': {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    /// Network error while fetching a remote thumbnail or full image
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The owning task was cancelled; never shown to the user
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects a single item (the pipeline keeps going)
    pub fn is_per_item(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::Fetch { .. } | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
