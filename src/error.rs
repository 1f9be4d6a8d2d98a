// src/error.rs

//! Unified error handling for the scraper.

use std::fmt;

use thiserror::Error;

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 payload from the store could not be decoded
    #[cfg(feature = "github")]
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data shape error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record carries none of the identity fields
    #[error("Record has no identity field (tried: {candidates})")]
    MissingIdentity { candidates: String },

    /// Document does not exist in the store
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The store rejected a write because the revision did not match
    #[error("Write conflict on {path}: {message}")]
    Conflict { path: String, message: String },

    /// A write conflicted again after re-reading the current revision
    #[error("Write conflict on {0} persisted after re-reading the current revision")]
    ConflictRetryExhausted(String),

    /// Backend signalled rate limiting
    #[error("Rate limited by {service}: {message}")]
    RateLimited { service: String, message: String },

    /// Backend returned an unexpected status
    #[error("{service} returned {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// Source adapter failed to produce data
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notify(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a write conflict error.
    pub fn conflict(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Conflict {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::RateLimited {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create an unexpected-status error.
    pub fn api(service: impl Into<String>, status: u16, message: impl fmt::Display) -> Self {
        Self::Api {
            service: service.into(),
            status,
            message: message.to_string(),
        }
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    /// Errors that must abort the whole pass instead of a single document.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
