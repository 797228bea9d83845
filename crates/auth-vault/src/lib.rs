//! Persisted local auth artifacts for the Tourline client.
//!
//! This crate owns the single namespaced storage slot holding serialized
//! token material, plus the ephemeral manual-clear flag used to suppress
//! listener reentrancy during an explicit reset. It provides:
//! - [`AuthVault`]: the low-level set/get/delete storage trait
//! - [`FileVault`]: JSON-file-backed implementation under the app data dir
//! - [`MemoryVault`]: in-memory implementation for tests and fakes
//! - [`SessionArtifacts`]: the high-level manager the coordinator uses

mod artifacts;
mod file;
mod keys;
mod memory;
mod traits;

pub use artifacts::{SessionArtifacts, StoredSession};
pub use file::FileVault;
pub use keys::VaultKeys;
pub use memory::MemoryVault;
pub use traits::AuthVault;

use std::path::PathBuf;

use thiserror::Error;

/// Application namespace for the on-disk vault location.
pub const APP_DIR_NAME: &str = "tourline";

/// Error type for vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Filesystem failure reading or writing the backing store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value failed to serialize or deserialize.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// No usable location for the backing store.
    #[error("vault path unavailable: {0}")]
    Path(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Default location of the file-backed vault: `<data_dir>/tourline/auth-vault.json`.
pub fn default_vault_path() -> VaultResult<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| VaultError::Path("no platform data directory".to_string()))?;
    Ok(base.join(APP_DIR_NAME).join("auth-vault.json"))
}
