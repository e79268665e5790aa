//! The token and the user profile treated as one record.
//!
//! The backing [`CredentialStore`] keeps them under two unrelated keys.
//! `SessionVault` writes both or neither, and on read either returns both
//! or clears whatever partial state it found.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{AuthToken, CredentialStore, Identity, StoreError};
use crate::models::User;

/// Store key for the bearer token
pub const TOKEN_KEY: &str = "access_token";

/// Store key for the serialized user profile
pub const USER_KEY: &str = "user";

#[derive(Clone)]
pub struct SessionVault {
    store: Arc<dyn CredentialStore>,
}

impl SessionVault {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Write user then token. If the token cannot be written the user
    /// entry is removed again so no half-record is left behind.
    pub async fn save(&self, identity: &Identity) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(&identity.user)
            .map_err(|e| StoreError::Unavailable(format!("Failed to serialize user: {}", e)))?;

        self.store.set(USER_KEY, &user_json).await?;

        if let Err(e) = self.store.set(TOKEN_KEY, identity.token.expose()).await {
            if let Err(revert) = self.store.remove(USER_KEY).await {
                warn!(error = %revert, "Failed to revert user entry after token write failure");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Both entries, or `None` after clearing any partial state.
    pub async fn load(&self) -> Option<Identity> {
        let token = self.read(TOKEN_KEY).await;
        let user_json = self.read(USER_KEY).await;

        match (token, user_json) {
            (Some(token), Some(user_json)) => match serde_json::from_str::<User>(&user_json) {
                Ok(user) => {
                    return Some(Identity {
                        user,
                        token: AuthToken::new(token),
                    })
                }
                Err(e) => warn!(error = %e, "Stored user profile is unreadable"),
            },
            (None, None) => {
                debug!("No stored credentials");
                return None;
            }
            (token, user) => debug!(
                has_token = token.is_some(),
                has_user = user.is_some(),
                "Partial stored credentials"
            ),
        }

        self.clear().await;
        None
    }

    /// Remove both entries. Failures are logged, never returned.
    pub async fn clear(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "Failed to remove stored credential");
            }
        }
    }

    /// The stored bearer token alone, read fresh on every call.
    pub async fn token(&self) -> Option<AuthToken> {
        self.read(TOKEN_KEY).await.map(AuthToken::new)
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Credential read failed, treating as absent");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::MemoryStore;
    use crate::models::Role;

    fn identity() -> Identity {
        Identity {
            user: User::new("1", "Admin", "admin@example.com", Role::Admin),
            token: AuthToken::new("tok-abc"),
        }
    }

    /// Memory store that refuses writes to one key.
    struct RejectingStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    #[async_trait]
    impl CredentialStore for RejectingStore {
        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if key == self.reject {
                return Err(StoreError::Unavailable("denied".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let vault = SessionVault::new(Arc::new(MemoryStore::new()));
        vault.save(&identity()).await.unwrap();

        let loaded = vault.load().await.unwrap();
        assert_eq!(loaded.user.email, "admin@example.com");
        assert_eq!(loaded.token.expose(), "tok-abc");
        assert_eq!(vault.token().await.unwrap().expose(), "tok-abc");
    }

    #[tokio::test]
    async fn test_failed_token_write_reverts_user() {
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            reject: TOKEN_KEY,
        });
        let vault = SessionVault::new(store.clone());

        assert!(vault.save(&identity()).await.is_err());
        assert_eq!(store.get(USER_KEY).await.unwrap(), None);
        assert_eq!(store.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_without_user_is_cleared() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "tok-abc").await.unwrap();
        let vault = SessionVault::new(store.clone());

        assert!(vault.load().await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unparseable_user_is_cleared() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "tok-abc").await.unwrap();
        store.set(USER_KEY, "{not json").await.unwrap();
        let vault = SessionVault::new(store.clone());

        assert!(vault.load().await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let vault = SessionVault::new(store.clone());
        vault.save(&identity()).await.unwrap();

        vault.clear().await;
        vault.clear().await;
        assert!(store.is_empty().await);
        assert!(vault.token().await.is_none());
    }
}
