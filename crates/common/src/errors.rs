//! Error types for Vigil proxy
//!
//! This module defines common error types used throughout the Vigil platform,
//! with a focus on clear failure modes and operational visibility.

use thiserror::Error;

/// Main error type for Vigil operations
#[derive(Error, Debug)]
pub enum VigilError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No healthy upstream available
    #[error("No healthy upstream available")]
    NoHealthyUpstream,
}

/// Result type alias for Vigil operations
pub type VigilResult<T> = Result<T, VigilError>;

impl VigilError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Get the HTTP status code for this error
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::NoHealthyUpstream => 503,
        }
    }
}
