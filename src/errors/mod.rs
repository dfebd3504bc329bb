//! Error handling module for the enrollment data layer.
//!
//! Every remote failure is mapped into one `AppError` variant according to the
//! kind of operation that failed, so callers can tell a failed read from a
//! failed write without inspecting backend payloads.

use serde::Deserialize;
use thiserror::Error;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const FETCH_ERROR: &str = "FETCH_ERROR";
    pub const MUTATION_ERROR: &str = "MUTATION_ERROR";
    pub const UPLOAD_ERROR: &str = "UPLOAD_ERROR";
    pub const DELETE_ERROR: &str = "DELETE_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
}

/// Application error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    /// A select against the data API failed
    #[error("{0}")]
    Fetch(String),
    /// An insert, update or delete against the data API failed
    #[error("{0}")]
    Mutation(String),
    /// Uploading an object to storage failed
    #[error("Upload failed: {0}")]
    Upload(String),
    /// Removing an object from storage failed
    #[error("Delete failed: {0}")]
    Delete(String),
    /// Required backend configuration is missing or malformed
    #[error("{0}")]
    Configuration(String),
    /// Input rejected before any remote call was made
    #[error("{0}")]
    Validation(String),
}

impl AppError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => codes::FETCH_ERROR,
            AppError::Mutation(_) => codes::MUTATION_ERROR,
            AppError::Upload(_) => codes::UPLOAD_ERROR,
            AppError::Delete(_) => codes::DELETE_ERROR,
            AppError::Configuration(_) => codes::CONFIGURATION_ERROR,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
        }
    }

    /// Human-readable message, as recorded in the store's error field.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Error body returned by the hosted data and storage APIs.
///
/// The data API answers with `message`/`code`/`details`/`hint`; storage uses
/// `statusCode`/`error`/`message`. Both shapes land here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendError {
    /// Parse an error body, falling back to the HTTP status for non-JSON bodies.
    pub fn from_body(status: reqwest::StatusCode, body: &str) -> Self {
        match serde_json::from_str::<BackendError>(body) {
            Ok(parsed) if parsed.message.is_some() || parsed.error.is_some() => parsed,
            _ => BackendError {
                message: Some(fallback_message(status, body)),
                code: Some(status.as_u16().to_string()),
                ..Default::default()
            },
        }
    }

    /// The most specific human-readable message available.
    pub fn into_message(self) -> String {
        self.message
            .or(self.error)
            .unwrap_or_else(|| "Unknown backend error".to_string())
    }
}

fn fallback_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    } else {
        body.to_string()
    }
}
