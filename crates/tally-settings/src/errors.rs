//! Settings errors and override diagnostics.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems with the settings; the server does not start.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {path:?}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The settings file is not JSON.
    #[error("settings file {path:?} is not valid JSON: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Parser error with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged document is JSON but has the wrong shape (e.g. a string
    /// where a port number belongs).
    #[error("settings do not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),
    /// A value the server cannot run with.
    #[error("invalid setting {key}: {reason}")]
    InvalidValue {
        /// Dotted settings key, e.g. `server.tickIntervalMs`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// An environment override that was set but unusable. The file or default
/// value stays in effect.
///
/// These are collected rather than logged because settings are loaded before
/// the subscriber exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Environment variable name.
    pub key: &'static str,
    /// The value found in the environment.
    pub value: String,
    /// What would have been accepted.
    pub expected: String,
}

impl fmt::Display for RejectedOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={:?} ignored, expected {}",
            self.key, self.value, self.expected
        )
    }
}
