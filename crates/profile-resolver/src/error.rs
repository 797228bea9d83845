//! Error types for profile store operations.

use thiserror::Error;

/// Errors from the profile data store.
///
/// The resolver absorbs all of these into a fallback user; they only
/// surface directly from explicit update calls.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Network or transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store returned a non-success HTTP status.
    #[error("profile store error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body summary.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store was called without an authenticated context.
    #[error("no auth context: {0}")]
    NoContext(String),
}

/// Convenience Result alias for profile store operations.
pub type ProfileResult<T> = Result<T, ProfileError>;
