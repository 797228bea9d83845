//! Error taxonomy for the auth subsystem.
//!
//! The variants map one-to-one onto how the session coordinator reacts:
//! credential failures surface to the caller, transport and token failures
//! settle the machine to unauthenticated, profile failures are absorbed into
//! a fallback user, and a detected refresh loop halts automatic processing.

use thiserror::Error;

/// Errors produced by the identity gateway and its collaborators.
#[derive(Debug, Error, Clone)]
pub enum AuthError {
    /// Transport-level failure: connection refused, DNS, TLS, or a timeout.
    ///
    /// Handled locally by the coordinator (artifacts cleared, state settles
    /// to unauthenticated); never shown as a blocking error dialog.
    #[error("network or timeout error: {0}")]
    NetworkOrTimeout(String),

    /// The provider rejected the supplied email/password.
    ///
    /// Surfaced to the caller as a failed boolean plus message; never
    /// retried automatically.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The access or refresh token is expired, revoked, or malformed.
    #[error("expired or invalid token: {0}")]
    ExpiredOrInvalidToken(String),

    /// The profile data store lookup failed.
    ///
    /// Absorbed into a fallback user by the profile resolver; never blocking.
    #[error("profile lookup failed: {0}")]
    ProfileLookup(String),

    /// Too many auth events or refresh attempts in a short interval.
    ///
    /// Automatic processing stops; recovery is manual.
    #[error("refresh loop detected: {0}")]
    RefreshLoopDetected(String),

    /// Anything the taxonomy does not cover.
    #[error("auth error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AuthError::NetworkOrTimeout(err.to_string())
        } else {
            AuthError::Unknown(err.to_string())
        }
    }
}

/// Convenience Result alias for gateway operations.
pub type AuthResult<T> = Result<T, AuthError>;
