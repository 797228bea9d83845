//! Storage key constants.

/// Storage keys used by the auth subsystem.
pub struct VaultKeys;

impl VaultKeys {
    /// The serialized session artifacts (JSON, one namespaced slot).
    pub const SESSION: &'static str = "tourline.auth.session";

    /// Ephemeral flag set while an explicit local reset is in progress.
    ///
    /// Suppresses the push/pull machinery so the listener cannot race the
    /// clear operation. Never durable: any clear removes it.
    pub const MANUAL_CLEAR_IN_PROGRESS: &'static str = "tourline.auth.manual_clear_in_progress";
}
