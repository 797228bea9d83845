//! JSON-file-backed vault.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::traits::AuthVault;
use crate::{VaultError, VaultResult};

/// Vault persisted as a single JSON object on disk.
///
/// The whole map is rewritten on every mutation; the vault holds a handful
/// of small values, so this stays cheap and keeps the file consistent.
pub struct FileVault {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileVault {
    /// Opens (or creates) a vault at `path`, loading any existing contents.
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), entries = data.len(), "opened auth vault");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Opens the vault at the platform default location.
    pub fn open_default() -> VaultResult<Self> {
        Self::open(crate::default_vault_path()?)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &HashMap<String, String>) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl AuthVault for FileVault {
    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut data = self.data.lock().expect("lock poisoned");
        data.insert(key.to_string(), value.to_string());
        self.persist(&data)
    }

    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let data = self.data.lock().expect("lock poisoned");
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> VaultResult<bool> {
        let mut data = self.data.lock().expect("lock poisoned");
        let existed = data.remove(key).is_some();
        if existed {
            self.persist(&data)?;
        }
        Ok(existed)
    }
}

impl std::fmt::Debug for FileVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileVault")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
