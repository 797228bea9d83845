//! Low-level storage trait.

use crate::VaultResult;

/// Key-value storage for auth artifacts.
///
/// Implementations must be safe to call from multiple tasks; the values are
/// small opaque strings (serialized JSON).
pub trait AuthVault: Send + Sync {
    /// Stores a value, replacing any existing one.
    fn set(&self, key: &str, value: &str) -> VaultResult<()>;

    /// Retrieves a value, or `None` if absent.
    fn get(&self, key: &str) -> VaultResult<Option<String>>;

    /// Deletes a value. Returns whether it existed.
    fn delete(&self, key: &str) -> VaultResult<bool>;

    /// Whether a value exists for the key.
    fn has(&self, key: &str) -> VaultResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
