//! Custom error types for the backup core.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Archive {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
