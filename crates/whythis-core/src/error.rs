//! Error handling
//!
//! Typed errors for record operations, with descriptive messages and
//! recovery suggestions. Presentation (exit codes, wording) is left to the
//! caller.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while resolving, reading or writing records
#[derive(Error, Debug)]
pub enum WhyError {
    /// `add` was given a file that does not exist
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// No record could be resolved for the path
    #[error("No explanation found for: '{path}'")]
    NotFound { path: PathBuf },

    /// The path could not be turned into a canonical absolute path
    #[error("Cannot resolve path '{path}': {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another writer held the lock for longer than the timeout
    #[error("Timed out after {waited:?} waiting for lock '{path}'{}", holder_suffix(.holder))]
    LockTimeout {
        path: PathBuf,
        waited: Duration,
        holder: Option<String>,
    },

    /// Failed to read the store
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write the store
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store file exists but is not a valid record mapping
    #[error("Store at '{path}' is corrupted: {details}")]
    CorruptStore { path: PathBuf, details: String },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(h) if !h.is_empty() => format!(" (held by pid {h})"),
        _ => String::new(),
    }
}

impl WhyError {
    /// True when retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, WhyError::LockTimeout { .. })
    }

    /// True for both the soft and the add-only not-found outcomes
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WhyError::NotFound { .. } | WhyError::FileNotFound { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            WhyError::LockTimeout { .. } => Some(
                "Another whythis process is writing. Try again; if no other process is running, delete the stale .lock file.",
            ),
            WhyError::CorruptStore { .. } => {
                Some("Fix or move the store file aside; a fresh empty store will be created.")
            }
            WhyError::FileNotFound { .. } => Some("Check the path; add requires an existing file."),
            WhyError::Write { .. } | WhyError::AtomicWriteFailed { .. } => {
                Some("Check permissions and free space in the data directory.")
            }
            _ => None,
        }
    }
}

/// Result type for record operations
pub type WhyResult<T> = Result<T, WhyError>;
