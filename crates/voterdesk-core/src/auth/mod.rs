//! Authentication: credential persistence, session state and route gating.
//!
//! This module provides:
//! - `CredentialStore`: key/value persistence with keyring, encrypted file
//!   and in-memory backends
//! - `SessionVault`: the token and user profile stored as one record
//! - `SessionManager`: the single owner of session state (login, logout,
//!   forced invalidation on unauthorized responses)
//! - `guard`: routes, navigation and the redirect policy that follows
//!   session state

pub mod credentials;
pub mod file_store;
pub mod guard;
pub mod session;
pub mod vault;

pub use credentials::{CredentialStore, KeyringStore, MemoryStore, StoreError};
pub use file_store::EncryptedFileStore;
pub use guard::{redirect_for, HistoryNavigator, Navigator, Route, RouteGuard};
pub use session::{AuthToken, Identity, Session, SessionManager, SessionStatus};
pub use vault::SessionVault;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, StorageBackend};

/// Environment variable holding the encrypted file store passphrase
pub const STORE_PASSPHRASE_ENV: &str = "VOTERDESK_STORE_PASSPHRASE";

/// Build the credential store selected by `config`.
///
/// The file backend needs a passphrase; without one it is an error rather
/// than a silent fallback to an unencrypted file.
pub fn open_store(config: &Config, passphrase: Option<&str>) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.storage_backend() {
        StorageBackend::Keyring => Arc::new(KeyringStore::new()),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => {
            let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
                anyhow::anyhow!("File credential storage requires {}", STORE_PASSPHRASE_ENV)
            })?;
            let path = config.cache_dir()?.join(file_store::STORE_FILE);
            Arc::new(
                EncryptedFileStore::open(path, passphrase)
                    .context("Failed to open credential file")?,
            )
        }
    };
    Ok(store)
}
