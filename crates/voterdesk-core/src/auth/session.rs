//! Session state and the manager that owns it.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Initializing --> Authenticated | Unauthenticated
//! Unauthenticated --login--> Authenticated
//! Authenticated --logout | unauthorized--> Unauthenticated
//! ```
//!
//! `SessionManager` is the only writer. State is published through a
//! `watch` channel so the route guard (and anything else) can follow it.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::guard::{Navigator, Route};
use super::{CredentialStore, SessionVault};
use crate::api::error::{message_from_body, ApiError};
use crate::config::Config;
use crate::models::User;

/// Login endpoint, relative to the configured base URL
const LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    /// Stored credentials have been read and a decision was made.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::Unauthenticated
        )
    }
}

/// Bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Who is signed in and the token proving it. Always held together.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user: User,
    pub token: AuthToken,
}

/// Snapshot of the session. `identity` is present exactly when the status
/// is `Authenticated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    status: SessionStatus,
    identity: Option<Identity>,
}

impl Session {
    fn with_status(status: SessionStatus) -> Self {
        Self {
            status,
            identity: None,
        }
    }

    fn authenticated(identity: Identity) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            identity: Some(identity),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.identity.as_ref().map(|i| &i.user)
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.identity.as_ref().map(|i| &i.token)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_status(SessionStatus::Uninitialized)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    user: User,
    access_token: String,
}

pub struct SessionManager {
    client: Client,
    login_url: String,
    vault: SessionVault,
    state: watch::Sender<Session>,
    last_error: Mutex<Option<String>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl SessionManager {
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let (state, _) = watch::channel(Session::default());

        Ok(Self {
            client,
            login_url: format!("{}{}", config.base_url()?, LOGIN_PATH),
            vault: SessionVault::new(store),
            state,
            last_error: Mutex::new(None),
            navigator: None,
        })
    }

    /// Navigator used to send the user to login on forced invalidation.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn vault(&self) -> &SessionVault {
        &self.vault
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Token for outgoing requests: the stored one, or the in-memory one
    /// when storage is unavailable but the session is still authenticated.
    pub async fn access_token(&self) -> Option<AuthToken> {
        if let Some(token) = self.vault.token().await {
            return Some(token);
        }
        let token = self.state.borrow().token().cloned();
        if token.is_some() {
            debug!("Stored token missing, using in-memory session token");
        }
        token
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Message from the last failed login, if any.
    pub fn last_error(&self) -> Option<String> {
        self.error_slot().clone()
    }

    pub fn clear_error(&self) {
        *self.error_slot() = None;
    }

    fn error_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Restore the session from storage. Only the first call has any effect.
    pub async fn initialize(&self) {
        let started = self.state.send_if_modified(|session| {
            if session.status == SessionStatus::Uninitialized {
                session.status = SessionStatus::Initializing;
                true
            } else {
                false
            }
        });
        if !started {
            warn!(status = ?self.status(), "Session already initialized, ignoring");
            return;
        }

        let next = match self.vault.load().await {
            Some(identity) => {
                info!(user_id = %identity.user.id, "Session restored from storage");
                Session::authenticated(identity)
            }
            None => {
                debug!("No stored session");
                Session::with_status(SessionStatus::Unauthenticated)
            }
        };

        // A login or invalidation that landed while storage was being read wins.
        let applied = self.state.send_if_modified(|session| {
            if session.status == SessionStatus::Initializing {
                *session = next;
                true
            } else {
                false
            }
        });
        if !applied {
            debug!(status = ?self.status(), "Session changed during initialize, keeping it");
        }
    }

    /// Authenticate against the backend. Never errors: failures are
    /// recorded in [`last_error`](Self::last_error) and yield `false`.
    ///
    /// Concurrent calls are not serialized; the last one to finish wins.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.clear_error();

        if email.trim().is_empty() || password.is_empty() {
            *self.error_slot() = Some("Email and password required".to_string());
            return false;
        }

        match self.authenticate(email.trim(), password).await {
            Ok(identity) => {
                if let Err(e) = self.vault.save(&identity).await {
                    warn!(error = %e, "Failed to persist session, continuing in memory");
                }
                info!(user_id = %identity.user.id, role = identity.user.role.as_str(), "Login successful");
                self.state.send_replace(Session::authenticated(identity));
                true
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                *self.error_slot() = Some(login_failure_message(&e));
                false
            }
        }
    }

    /// Calls the login endpoint directly: the request pipeline would try
    /// to attach a token that does not exist yet.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: message_from_body(&body).unwrap_or_else(|| "Login failed".to_string()),
            });
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed login response: {}", e)))?;

        Ok(Identity {
            user: parsed.user,
            token: AuthToken::new(parsed.access_token),
        })
    }

    /// Clear stored credentials and drop the session. Safe to repeat.
    pub async fn logout(&self) {
        self.vault.clear().await;
        self.clear_error();
        self.state
            .send_replace(Session::with_status(SessionStatus::Unauthenticated));
        info!("Logged out");
    }

    /// Called by the request pipeline on a 401. Same as [`logout`](Self::logout)
    /// plus a single navigation to the login route.
    ///
    /// Navigation happens before the new status is published, so the route
    /// guard already sees the login route and does not redirect again.
    pub async fn force_invalidate(&self) {
        self.vault.clear().await;

        if let Some(navigator) = &self.navigator {
            if navigator.current() != Route::Login {
                navigator.replace(Route::Login);
            }
        }

        let changed = self.state.send_if_modified(|session| {
            if session.status == SessionStatus::Unauthenticated {
                false
            } else {
                *session = Session::with_status(SessionStatus::Unauthenticated);
                true
            }
        });
        if changed {
            warn!("Session invalidated by unauthorized response");
        }
    }
}

fn login_failure_message(err: &ApiError) -> String {
    match err {
        ApiError::Http { message, .. } => message.clone(),
        ApiError::Timeout => "Connection timed out. Please try again.".to_string(),
        ApiError::Network(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        other => format!("Login failed: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::guard::HistoryNavigator;
    use crate::auth::MemoryStore;
    use crate::models::Role;

    fn manager(store: Arc<MemoryStore>) -> SessionManager {
        SessionManager::new(&Config::with_api_url("http://127.0.0.1:9"), store).unwrap()
    }

    fn identity() -> Identity {
        Identity {
            user: User::new("1", "Admin", "admin@example.com", Role::Admin),
            token: AuthToken::new("tok-abc"),
        }
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret-value"));
        assert!(!format!("{:?}", identity()).contains("tok-abc"));
    }

    #[test]
    fn test_starts_uninitialized() {
        let manager = manager(Arc::new(MemoryStore::new()));
        assert_eq!(manager.status(), SessionStatus::Uninitialized);
        assert!(manager.session().identity().is_none());
        assert!(!manager.status().is_settled());
    }

    #[tokio::test]
    async fn test_initialize_restores_stored_identity() {
        let store = Arc::new(MemoryStore::new());
        SessionVault::new(store.clone()).save(&identity()).await.unwrap();

        let manager = manager(store);
        manager.initialize().await;

        assert_eq!(manager.status(), SessionStatus::Authenticated);
        assert_eq!(manager.user().unwrap().id, "1");
        assert_eq!(manager.session().token().unwrap().expose(), "tok-abc");
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());
        manager.initialize().await;
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);

        SessionVault::new(store).save(&identity()).await.unwrap();
        manager.initialize().await;
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_rejects_empty_credentials() {
        let manager = manager(Arc::new(MemoryStore::new()));
        manager.initialize().await;

        assert!(!manager.login("", "secret").await);
        assert_eq!(manager.last_error().as_deref(), Some("Email and password required"));
        assert!(!manager.login("a@example.com", "").await);
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);

        manager.clear_error();
        assert!(manager.last_error().is_none());
    }

    #[tokio::test]
    async fn test_login_network_failure_returns_false() {
        let manager = manager(Arc::new(MemoryStore::new()));
        manager.initialize().await;

        assert!(!manager.login("admin@example.com", "admin123").await);
        assert!(manager.last_error().is_some());
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_twice() {
        let store = Arc::new(MemoryStore::new());
        SessionVault::new(store.clone()).save(&identity()).await.unwrap();
        let manager = manager(store.clone());
        manager.initialize().await;

        manager.logout().await;
        let after_first = manager.session();
        manager.logout().await;

        assert_eq!(manager.session(), after_first);
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(manager.user().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_force_invalidate_navigates_once() {
        let store = Arc::new(MemoryStore::new());
        SessionVault::new(store.clone()).save(&identity()).await.unwrap();
        let navigator = Arc::new(HistoryNavigator::new(Route::Search));
        let manager = manager(store.clone()).with_navigator(navigator.clone());
        manager.initialize().await;

        manager.force_invalidate().await;
        manager.force_invalidate().await;

        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert_eq!(navigator.current(), Route::Login);
        assert_eq!(navigator.history(), vec![Route::Login]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let manager = manager(Arc::new(MemoryStore::new()));
        let mut rx = manager.subscribe();

        manager.initialize().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status(), SessionStatus::Unauthenticated);
    }

    #[test]
    fn test_login_failure_messages() {
        assert_eq!(
            login_failure_message(&ApiError::Http {
                status: 401,
                message: "Invalid credentials".to_string()
            }),
            "Invalid credentials"
        );
        assert_eq!(
            login_failure_message(&ApiError::Timeout),
            "Connection timed out. Please try again."
        );
    }
}
