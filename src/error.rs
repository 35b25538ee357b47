//! Error types for Sockrelay
//!
//! This module defines the error kinds a relay session or an
//! authentication refresh can produce.

use std::io;
use thiserror::Error;

/// Main error type for Sockrelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// The fixed upstream could not be reached
    #[error("Dial error: {0}")]
    Dial(#[source] io::Error),

    /// Mid-session I/O failure on either side of a relay
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// Half-close requested on a stream that cannot express it
    #[error("Capability error: {0}")]
    Capability(String),

    /// The directory snapshot could not be fetched
    #[error("Auth refresh error: {0}")]
    AuthRefresh(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Whether this error came from dialing the upstream
    pub fn is_dial(&self) -> bool {
        matches!(self, RelayError::Dial(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::AuthRefresh(err.to_string())
    }
}
