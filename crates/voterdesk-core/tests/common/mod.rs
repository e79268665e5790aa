#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use voterdesk_core::api::ApiClient;
use voterdesk_core::auth::{HistoryNavigator, MemoryStore, Route, SessionManager};
use voterdesk_core::config::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub navigator: Arc<HistoryNavigator>,
    pub session: Arc<SessionManager>,
    pub api: ApiClient,
}

pub fn test_config(server: &MockServer) -> Config {
    Config {
        retry_delay_ms: 10,
        ..Config::with_api_url(server.uri())
    }
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

pub async fn harness_with(tweak: impl FnOnce(&mut Config)) -> Harness {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    tweak(&mut config);
    build(server, config, Arc::new(MemoryStore::new()))
}

pub fn build(server: MockServer, config: Config, store: Arc<MemoryStore>) -> Harness {
    let navigator = Arc::new(HistoryNavigator::new(Route::Search));
    let session = Arc::new(
        SessionManager::new(&config, store.clone())
            .unwrap()
            .with_navigator(navigator.clone()),
    );
    let api = ApiClient::new(&config, session.clone()).unwrap();
    Harness {
        server,
        store,
        navigator,
        session,
        api,
    }
}

pub fn admin_json() -> Value {
    json!({"id": "1", "name": "Admin", "email": "admin@example.com", "role": "admin"})
}

pub async fn mount_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": admin_json(),
            "access_token": "tok-abc",
        })))
        .mount(server)
        .await;
}

/// Log in as the admin fixture through the mocked login endpoint.
pub async fn login(h: &Harness) {
    mount_login_ok(&h.server).await;
    h.session.initialize().await;
    assert!(h.session.login("admin@example.com", "admin123").await);
}
