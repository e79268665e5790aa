//! Routes and the redirect policy that keeps them in step with the session.
//!
//! The policy itself is the pure [`redirect_for`]; [`RouteGuard`] applies it
//! whenever the session status or the current route changes.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{SessionManager, SessionStatus};

/// Client screens. `Login` is the only screen in the auth group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    Search,
    VoterList,
    UserManage,
    UserAdd,
    UserEdit { id: String },
    Profile,
    ChangePassword,
    NotFound(String),
}

impl Route {
    /// Landing screen once authenticated.
    pub const LANDING: Route = Route::Dashboard;

    /// Parse a path such as `/(drawer)/user-edit?id=7` or `/login`.
    /// Group segments in parentheses are optional.
    pub fn parse(path: &str) -> Route {
        let (path_part, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments: Vec<&str> = path_part
            .split('/')
            .filter(|s| !s.is_empty() && !(s.starts_with('(') && s.ends_with(')')))
            .collect();

        match segments.as_slice() {
            [] | ["dashboard"] => Route::Dashboard,
            ["login"] => Route::Login,
            ["search"] => Route::Search,
            ["voter-list"] => Route::VoterList,
            ["user-manage"] => Route::UserManage,
            ["user-add"] => Route::UserAdd,
            ["profile"] => Route::Profile,
            ["change-password"] => Route::ChangePassword,
            ["user-edit"] => match query_param(query, "id") {
                Some(id) => Route::UserEdit { id },
                None => Route::NotFound(path.to_string()),
            },
            ["user-edit", id] => Route::UserEdit { id: id.to_string() },
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/(auth)/login".to_string(),
            Route::Dashboard => "/(drawer)/dashboard".to_string(),
            Route::Search => "/(drawer)/search".to_string(),
            Route::VoterList => "/(drawer)/voter-list".to_string(),
            Route::UserManage => "/(drawer)/user-manage".to_string(),
            Route::UserAdd => "/(drawer)/user-add".to_string(),
            Route::UserEdit { id } => format!("/(drawer)/user-edit?id={}", id),
            Route::Profile => "/(drawer)/profile".to_string(),
            Route::ChangePassword => "/(drawer)/change-password".to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }

    pub fn is_auth_group(&self) -> bool {
        matches!(self, Route::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Where to send the user given `status` and the `current` route, if anywhere.
///
/// No redirect is ever issued before the stored credentials have been read.
pub fn redirect_for(status: SessionStatus, current: &Route) -> Option<Route> {
    match status {
        SessionStatus::Uninitialized | SessionStatus::Initializing => None,
        SessionStatus::Authenticated => match current {
            Route::Login | Route::NotFound(_) => Some(Route::LANDING),
            _ => None,
        },
        SessionStatus::Unauthenticated if current.is_auth_group() => None,
        SessionStatus::Unauthenticated => Some(Route::Login),
    }
}

/// The navigation surface the session layer drives.
pub trait Navigator: Send + Sync {
    fn current(&self) -> Route;

    /// Replace the current route without pushing history.
    fn replace(&self, route: Route);

    fn subscribe(&self) -> watch::Receiver<Route>;
}

/// In-process navigator that records every replacement.
pub struct HistoryNavigator {
    current: watch::Sender<Route>,
    history: Mutex<Vec<Route>>,
}

impl HistoryNavigator {
    pub fn new(initial: Route) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            current,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Routes passed to `replace`, oldest first.
    pub fn history(&self) -> Vec<Route> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Simulate the user opening a screen.
    pub fn open(&self, route: Route) {
        debug!(route = %route, "Route opened");
        self.current.send_replace(route);
    }
}

impl Navigator for HistoryNavigator {
    fn current(&self) -> Route {
        self.current.borrow().clone()
    }

    fn replace(&self, route: Route) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(route.clone());
        self.current.send_replace(route);
    }

    fn subscribe(&self) -> watch::Receiver<Route> {
        self.current.subscribe()
    }
}

/// Applies [`redirect_for`] on every session or route change.
pub struct RouteGuard {
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> Self {
        Self { session, navigator }
    }

    /// Evaluate once and navigate if needed. Returns the redirect target.
    pub fn evaluate(&self) -> Option<Route> {
        let status = self.session.status();
        let current = self.navigator.current();
        let target = redirect_for(status, &current);
        if let Some(ref target) = target {
            info!(?status, from = %current, to = %target, "Route guard redirect");
            self.navigator.replace(target.clone());
        }
        target
    }

    /// Follow session and route changes until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let mut session_rx = self.session.subscribe();
        let mut route_rx = self.navigator.subscribe();
        self.evaluate();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = route_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            self.evaluate();
        }
        debug!("Route guard stopped");
    }

    /// Follow changes with no shutdown signal. The guard keeps both channels
    /// open itself, so this only ends when its task is aborted.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Spawn a guard that stops once `shutdown` resolves.
    pub fn spawn_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> JoinHandle<()> {
        tokio::spawn(self.run_until(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paths() {
        assert_eq!(Route::parse("/(auth)/login"), Route::Login);
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/"), Route::Dashboard);
        assert_eq!(Route::parse("/(drawer)/search"), Route::Search);
        assert_eq!(
            Route::parse("/user-edit?id=42"),
            Route::UserEdit { id: "42".to_string() }
        );
        assert_eq!(
            Route::parse("/reports"),
            Route::NotFound("/reports".to_string())
        );
        assert_eq!(
            Route::parse("/user-edit"),
            Route::NotFound("/user-edit".to_string())
        );
    }

    #[test]
    fn test_path_parses_back() {
        let routes = [
            Route::Login,
            Route::Dashboard,
            Route::ChangePassword,
            Route::UserEdit { id: "9".to_string() },
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn test_no_redirect_before_initialized() {
        for status in [SessionStatus::Uninitialized, SessionStatus::Initializing] {
            assert_eq!(redirect_for(status, &Route::Dashboard), None);
            assert_eq!(redirect_for(status, &Route::Login), None);
        }
    }

    #[test]
    fn test_authenticated_leaves_auth_group() {
        assert_eq!(
            redirect_for(SessionStatus::Authenticated, &Route::Login),
            Some(Route::Dashboard)
        );
        assert_eq!(redirect_for(SessionStatus::Authenticated, &Route::Search), None);
        assert_eq!(
            redirect_for(SessionStatus::Authenticated, &Route::NotFound("/x".into())),
            Some(Route::Dashboard)
        );
    }

    #[test]
    fn test_unauthenticated_goes_to_login() {
        assert_eq!(
            redirect_for(SessionStatus::Unauthenticated, &Route::Profile),
            Some(Route::Login)
        );
        assert_eq!(
            redirect_for(SessionStatus::Unauthenticated, &Route::NotFound("/x".into())),
            Some(Route::Login)
        );
        assert_eq!(redirect_for(SessionStatus::Unauthenticated, &Route::Login), None);
    }

    #[tokio::test]
    async fn test_guard_stops_on_shutdown() {
        use crate::auth::MemoryStore;
        use crate::config::Config;

        let session = Arc::new(
            SessionManager::new(&Config::with_api_url("http://127.0.0.1:9"), Arc::new(MemoryStore::new()))
                .unwrap(),
        );
        session.initialize().await;
        let nav = Arc::new(HistoryNavigator::new(Route::Profile));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let handle = RouteGuard::new(session, nav.clone()).spawn_until(async {
            let _ = stopped.await;
        });
        stop.send(()).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("guard did not stop")
            .unwrap();
        assert_eq!(nav.history(), vec![Route::Login]);
    }

    #[test]
    fn test_history_navigator_records_replacements() {
        let nav = HistoryNavigator::new(Route::Dashboard);
        nav.open(Route::Search);
        nav.replace(Route::Login);
        assert_eq!(nav.current(), Route::Login);
        assert_eq!(nav.history(), vec![Route::Login]);
    }
}
