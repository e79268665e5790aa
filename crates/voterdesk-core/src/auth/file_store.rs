//! Encrypted file backend for platforms without an OS keychain.
//!
//! All entries live in one JSON file next to a random salt. Each value is
//! sealed with ChaCha20-Poly1305 under a key derived from a passphrase with
//! Argon2; the stored form is `base64(nonce || ciphertext)`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argon2::Argon2;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CredentialStore, StoreError};

/// Store file name in the cache directory
pub const STORE_FILE: &str = "credentials.json";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    salt: String,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

pub struct EncryptedFileStore {
    path: PathBuf,
    cipher: ChaCha20Poly1305,
    file: Mutex<StoreFile>,
}

impl EncryptedFileStore {
    /// Open `path`, creating it with a fresh salt if it does not exist.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read credential file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse credential file")?
        } else {
            let mut salt = [0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            let file = StoreFile {
                salt: BASE64.encode(salt),
                entries: BTreeMap::new(),
            };
            write_atomic(&path, &file)?;
            file
        };

        let salt = BASE64
            .decode(&file.salt)
            .context("Credential file has an invalid salt")?;
        let cipher = derive_cipher(passphrase, &salt)?;
        debug!(path = %path.display(), entries = file.entries.len(), "Credential file opened");

        Ok(Self {
            path,
            cipher,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seal(&self, value: &str) -> Result<String, StoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
            .map_err(|_| StoreError::Unavailable("Failed to encrypt credential".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    fn open_sealed(&self, sealed: &str) -> Result<String, StoreError> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|e| StoreError::Unavailable(format!("Corrupt credential entry: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(StoreError::Unavailable("Corrupt credential entry: too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                StoreError::Unavailable("Failed to decrypt credential (wrong passphrase?)".to_string())
            })?;
        String::from_utf8(plaintext)
            .map_err(|_| StoreError::Unavailable("Credential is not valid UTF-8".to_string()))
    }
}

fn derive_cipher(passphrase: &str, salt: &[u8]) -> Result<ChaCha20Poly1305> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Failed to derive credential key: {}", e))?;
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
}

fn write_atomic(path: &Path, file: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn unavailable(err: anyhow::Error) -> StoreError {
    StoreError::Unavailable(format!("{:#}", err))
}

#[async_trait]
impl CredentialStore for EncryptedFileStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sealed = self.seal(value)?;
        let mut file = self.file.lock().await;
        let previous = file.entries.insert(key.to_string(), sealed);
        if let Err(e) = write_atomic(&self.path, &file) {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(old) => file.entries.insert(key.to_string(), old),
                None => file.entries.remove(key),
            };
            return Err(unavailable(e));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let file = self.file.lock().await;
        match file.entries.get(key) {
            Some(sealed) => self.open_sealed(sealed).map(Some),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut file = self.file.lock().await;
        let Some(old) = file.entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = write_atomic(&self.path, &file) {
            file.entries.insert(key.to_string(), old);
            return Err(unavailable(e));
        }
        Ok(())
    }
}
