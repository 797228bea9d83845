//! In-memory vault for tests and fakes.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::traits::AuthVault;
use crate::VaultResult;

/// In-memory key-value store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryVault {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthVault for MemoryVault {
    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut data = self.data.lock().expect("lock poisoned");
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let data = self.data.lock().expect("lock poisoned");
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> VaultResult<bool> {
        let mut data = self.data.lock().expect("lock poisoned");
        Ok(data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let vault = MemoryVault::new();

        vault.set("k", "v").unwrap();
        assert_eq!(vault.get("k").unwrap(), Some("v".to_string()));
        assert!(vault.has("k").unwrap());

        assert!(vault.delete("k").unwrap());
        assert!(!vault.delete("k").unwrap());
        assert_eq!(vault.get("k").unwrap(), None);
        assert!(!vault.has("k").unwrap());
    }

    #[test]
    fn set_overwrites() {
        let vault = MemoryVault::new();
        vault.set("k", "first").unwrap();
        vault.set("k", "second").unwrap();
        assert_eq!(vault.get("k").unwrap(), Some("second".to_string()));
    }
}
