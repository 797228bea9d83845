//! Wire types for the identity provider.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The provider's identity record for an authenticated user.
///
/// `user_metadata` is an arbitrary map the provider stores alongside the
/// account (display name, agency name, and whatever else sign-up attached).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    /// Provider-assigned user id (opaque string).
    pub id: String,
    /// Account email.
    pub email: String,
    /// Arbitrary metadata attached at sign-up or by later updates.
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl IdentityUser {
    /// Returns a metadata value as a string, if present and a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(|v| v.as_str())
    }
}

/// A server-issued session: token material, expiry, and the identity record.
///
/// Owned by the gateway and read-only to the rest of the subsystem.
/// Destroyed on sign-out or expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain a fresh access token.
    pub refresh_token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// The provider's identity record for the session owner.
    pub user: IdentityUser,
}

impl Session {
    /// Whether the access token has already expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the access token expires within `margin` of `now`.
    ///
    /// Used by the periodic expiry check to refresh ahead of time.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}
