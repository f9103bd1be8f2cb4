//! Error types for Y-Share.
//!
//! This module provides a unified error type for all Y-Share operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Y-Share operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Y-Share.
#[derive(Error, Debug)]
pub enum Error {
    /// Upload request carried no files
    #[error("no files were uploaded")]
    NoFiles,

    /// Code not found: never issued, expired or malformed (E003)
    #[error("code '{0}' is invalid or has expired")]
    CodeNotFound(String),

    /// Remote blob store failed to serve a file (E005)
    #[error("failed to fetch '{url}' from remote storage: {reason}")]
    UpstreamFetch {
        /// Locator of the blob that could not be fetched
        url: String,
        /// Reason for failure
        reason: String,
    },

    /// Remote blob store rejected an upload (E012)
    #[error("failed to store upload in remote storage: {0}")]
    UpstreamUpload(String),

    /// No free code found within the retry budget (E011)
    #[error("no free share code after {attempts} attempts")]
    CapacityExhausted {
        /// Number of draws that collided
        attempts: u32,
    },

    /// Invalid code format
    #[error("invalid code format: {0}")]
    InvalidCodeFormat(String),

    /// Archive encoder failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::CodeNotFound(_) => Some("E003"),
            Self::UpstreamFetch { .. } => Some("E005"),
            Self::CapacityExhausted { .. } => Some("E011"),
            Self::UpstreamUpload(_) => Some("E012"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (the caller may try again).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoFiles
                | Self::UpstreamFetch { .. }
                | Self::UpstreamUpload(_)
                | Self::CapacityExhausted { .. }
        )
    }

    /// Build an [`Error::UpstreamFetch`] from any displayable cause.
    pub fn upstream_fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UpstreamFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
