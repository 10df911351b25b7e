//! Error taxonomy for the import pipeline.
//!
//! Only [`ImportError::Fetch`] is fatal to a run. Everything raised while
//! loading a single file is caught by the orchestrator and recorded as a
//! per-file outcome.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Network failure or non-success HTTP status.
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Source file could not be decoded or parsed.
    #[error("parsing {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Staging or cleanup I/O failure.
    #[error("file operation on {} failed: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("table '{0}' does not exist in the store")]
    MissingTable(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ImportError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
