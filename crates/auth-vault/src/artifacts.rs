//! High-level session artifact manager.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keys::VaultKeys;
use crate::traits::AuthVault;
use crate::VaultResult;

/// Serialized token material persisted in the vault's session slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain a fresh access token.
    pub refresh_token: String,
    /// Provider user id.
    pub user_id: String,
    /// Account email, when the provider reported one.
    #[serde(default)]
    pub email: Option<String>,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    /// Whether the stored token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

/// Manager for the persisted auth artifacts.
///
/// One writer context (the session coordinator) mutates through this; other
/// components only read. Clearing is idempotent. The manual-clear flag is
/// managed separately because it guards the clear operation itself.
#[derive(Clone)]
pub struct SessionArtifacts {
    vault: Arc<dyn AuthVault>,
}

impl SessionArtifacts {
    /// Wraps a vault.
    pub fn new(vault: Arc<dyn AuthVault>) -> Self {
        Self { vault }
    }

    /// Persists the session, replacing any previous one.
    pub fn store(&self, session: &StoredSession) -> VaultResult<()> {
        let serialized = serde_json::to_string(session)?;
        self.vault.set(VaultKeys::SESSION, &serialized)
    }

    /// Loads the persisted session, if any.
    ///
    /// A slot that fails to deserialize is treated as poisoned: it is
    /// deleted and reported as absent rather than erroring the caller into
    /// a retry loop against the same bad bytes.
    pub fn load(&self) -> VaultResult<Option<StoredSession>> {
        let Some(serialized) = self.vault.get(VaultKeys::SESSION)? else {
            return Ok(None);
        };
        match serde_json::from_str(&serialized) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                debug!(error = %err, "discarding undecodable session artifacts");
                self.vault.delete(VaultKeys::SESSION)?;
                Ok(None)
            }
        }
    }

    /// Whether any session artifacts are persisted.
    pub fn has_session(&self) -> VaultResult<bool> {
        self.vault.has(VaultKeys::SESSION)
    }

    /// Whether the persisted token expires within `margin` of `now`.
    ///
    /// `None` when no session is persisted.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> VaultResult<Option<bool>> {
        Ok(self.load()?.map(|s| s.expires_within(now, margin)))
    }

    /// Removes all persisted auth artifacts. Idempotent.
    pub fn clear(&self) -> VaultResult<()> {
        self.vault.delete(VaultKeys::SESSION)?;
        Ok(())
    }

    /// Marks an explicit local reset as in progress.
    pub fn begin_manual_clear(&self) -> VaultResult<()> {
        self.vault.set(VaultKeys::MANUAL_CLEAR_IN_PROGRESS, "1")
    }

    /// Ends the explicit local reset.
    pub fn end_manual_clear(&self) -> VaultResult<()> {
        self.vault.delete(VaultKeys::MANUAL_CLEAR_IN_PROGRESS)?;
        Ok(())
    }

    /// Whether an explicit local reset is in progress.
    ///
    /// The push/pull machinery skips event handling while this is set, so
    /// the listener cannot race the clear operation.
    pub fn manual_clear_in_progress(&self) -> bool {
        self.vault
            .has(VaultKeys::MANUAL_CLEAR_IN_PROGRESS)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SessionArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionArtifacts").finish_non_exhaustive()
    }
}
