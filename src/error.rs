//! Unified error type for the coordination engine.
//!
//! Defines [`CoordError`], covering the taxonomy the conflict detector's
//! public API can fail with. Error messages are agent-friendly: each variant
//! describes what went wrong and what to do about it. `StaleRead` is
//! deliberately absent — a stale write is returned as a successful call
//! carrying a `Conflict`, not an `Err`.

use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CoordError
// ---------------------------------------------------------------------------

/// Unified error type for coordination engine operations.
#[derive(Debug)]
pub enum CoordError {
    /// A conflict id, tracked file, or version hash was not found.
    NotFound {
        /// What kind of thing was being looked up.
        what: String,
        /// The identifier that was not found.
        id: String,
    },

    /// A resolution or operation was requested that its preconditions do
    /// not support (e.g. `auto-merged` resolution with no merge result).
    Precondition {
        /// Human-readable description of the unmet precondition.
        detail: String,
    },

    /// A disk read failed.
    IoRead {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A disk write failed.
    IoWrite {
        /// The path that failed to write.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A merge was attempted on a binary file.
    BinaryUnmergeable {
        /// The path of the binary file.
        path: PathBuf,
    },

    /// The engine configuration file could not be loaded or parsed.
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// The filesystem watcher failed to start, stop, or process an event.
    Watcher {
        /// Human-readable description of the failure.
        detail: String,
        /// The underlying `notify` error, if any.
        source: Option<notify::Error>,
    },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, id } => {
                write!(
                    f,
                    "{what} '{id}' not found.\n  To fix: check that the id is correct and the referenced state has not already been removed."
                )
            }
            Self::Precondition { detail } => {
                write!(
                    f,
                    "precondition failed: {detail}\n  To fix: check the required preconditions before retrying."
                )
            }
            Self::IoRead { path, source } => {
                write!(
                    f,
                    "failed to read '{}': {source}\n  To fix: check file permissions and that the path exists.",
                    path.display()
                )
            }
            Self::IoWrite { path, source } => {
                write!(
                    f,
                    "failed to write '{}': {source}\n  To fix: check file permissions and available disk space.",
                    path.display()
                )
            }
            Self::BinaryUnmergeable { path } => {
                write!(
                    f,
                    "'{}' is a binary file and cannot be merged.\n  To fix: resolve manually with keep-ours or keep-theirs.",
                    path.display()
                )
            }
            Self::Config { path, detail } => {
                write!(
                    f,
                    "configuration error in '{}': {detail}\n  To fix: edit the config file and correct the issue.",
                    path.display()
                )
            }
            Self::Watcher { detail, .. } => {
                write!(
                    f,
                    "filesystem watcher error: {detail}\n  To fix: check that the workspace root exists and is readable."
                )
            }
        }
    }
}

impl std::error::Error for CoordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoRead { source, .. } | Self::IoWrite { source, .. } => Some(source),
            Self::Watcher {
                source: Some(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for CoordError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config {
            path: err.path.unwrap_or_default(),
            detail: err.message,
        }
    }
}

impl From<notify::Error> for CoordError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher {
            detail: err.to_string(),
            source: Some(err),
        }
    }
}
