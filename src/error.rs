//! Error taxonomy for the Upload-Files storage subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Requested upload/entry/path absent, or a malformed raw-path was supplied.
    #[error("not found: {0}")]
    NotFound(String),

    /// Read attempted against a file or archive record the access predicate denies.
    #[error("restricted: {0}")]
    Restricted(String),

    /// Staging mutation attempted on a frozen upload.
    #[error("upload is frozen: {0}")]
    Frozen(String),

    /// `to_staging` called on an upload already being edited, or `re_pack` called
    /// while `...-repacked` outputs linger from a prior attempt.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The archive codec detected a truncated or inconsistent container on open.
    #[error("corrupt archive container {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Underlying filesystem or zip error.
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error raised by the `zip` crate while reading or writing a raw archive.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
