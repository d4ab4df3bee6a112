//! Login-to-logout flows through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use portal_session::{
    AuthBackend, AuthClient, Clock, Credential, ExpiryPolicy, GuardState, LoginResponse,
    MemoryTokenStore, MonitorState, Navigator, Notice, Notifier, Principal, RemoteError,
    Rendered, RouteGuard, SessionConfig, SessionExpiryMonitor, SessionService, SessionValidator,
    Token, TokenStore,
};

#[derive(Default)]
struct Toasts(Mutex<Vec<Notice>>);

impl Toasts {
    fn seen(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for Toasts {
    fn notify(&self, notice: &Notice) {
        self.0.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
struct History(Mutex<Vec<String>>);

impl History {
    fn visited(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Navigator for History {
    fn redirect(&self, path: &str) {
        self.0.lock().unwrap().push(path.to_owned());
    }
}

// ── HTTP backend ───────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Backend {
    me_calls: Arc<AtomicUsize>,
}

async fn login(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    match (body["email"].as_str(), body["password"].as_str()) {
        (Some("ops@example.com"), Some("hunter2")) => Ok(Json(json!({
            "token": "admin-token",
            "user": { "_id": "1", "role": "admin", "email": "ops@example.com" }
        }))),
        (Some("dana@example.com"), Some("pw")) => Ok(Json(json!({
            "token": "user-token",
            "user": { "_id": "2", "role": "user", "email": "dana@example.com" }
        }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn me(State(backend): State<Backend>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    backend.me_calls.fetch_add(1, Ordering::SeqCst);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer admin-token") => Ok(Json(json!({ "user": { "role": "admin" } }))),
        Some("Bearer user-token") => Ok(Json(json!({ "user": { "role": "user" } }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn spawn_backend() -> (url::Url, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api").parse().unwrap(), backend)
}

struct Portal {
    session: SessionService<AuthClient>,
    guard: RouteGuard<AuthClient>,
    toasts: Arc<Toasts>,
    router: Arc<History>,
    backend: Backend,
}

async fn portal() -> Portal {
    let (base, backend) = spawn_backend().await;
    let config = SessionConfig::new(base);
    let client = AuthClient::new(config.client().clone()).unwrap();
    let toasts = Arc::new(Toasts::default());
    let router = Arc::new(History::default());
    let validator = SessionValidator::builder(client, Arc::new(MemoryTokenStore::new()), config)
        .with_notifier(toasts.clone())
        .build();
    Portal {
        session: SessionService::new(validator.clone()),
        guard: RouteGuard::new(validator, router.clone()),
        toasts,
        router,
        backend,
    }
}

#[tokio::test]
async fn user_role_is_turned_away_from_admin_view() {
    let p = portal().await;
    p.session.login("dana@example.com", "pw").await.unwrap();

    let mut view = p.guard.mount(true);
    let state = view.resolved().await;

    assert_eq!(state, GuardState::Redirected("/login".into()));
    assert_eq!(view.render(|| "services"), Rendered::Redirect("/login".into()));
    assert_eq!(p.router.visited(), vec!["/login".to_string()]);
    assert_eq!(p.toasts.seen(), vec![Notice::AccessDenied]);
    assert!(!p.session.is_authenticated());
}

#[tokio::test]
async fn admin_views_share_cached_validation() {
    let p = portal().await;
    p.session.login("ops@example.com", "hunter2").await.unwrap();

    let mut services = p.guard.mount(true);
    assert_eq!(services.resolved().await, GuardState::Granted);
    assert_eq!(services.render(|| "services"), Rendered::Content("services"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut payments = p.guard.mount(true);
    assert_eq!(payments.resolved().await, GuardState::Granted);

    assert_eq!(p.backend.me_calls.load(Ordering::SeqCst), 1);
    assert!(p.router.visited().is_empty());
    assert!(p.toasts.seen().is_empty());
}

#[tokio::test]
async fn logout_sends_next_view_to_entry_point() {
    let p = portal().await;
    p.session.login("ops@example.com", "hunter2").await.unwrap();
    assert_eq!(p.guard.mount(false).resolved().await, GuardState::Granted);

    p.session.logout().unwrap();

    let mut view = p.guard.mount(false);
    assert_eq!(view.resolved().await, GuardState::Redirected("/login".into()));
    assert_eq!(p.backend.me_calls.load(Ordering::SeqCst), 1);
}

// ── Expiry ─────────────────────────────────────────────────────────

const HOUR_MS: u64 = 60 * 60 * 1000;
const BASE_MS: u64 = 1_700_000_000_000;

/// Wall clock driven by tokio's paused test clock.
struct PausedClock {
    start: tokio::time::Instant,
}

impl Clock for PausedClock {
    fn now_ms(&self) -> u64 {
        BASE_MS + u64::try_from(self.start.elapsed().as_millis()).unwrap()
    }
}

struct AlwaysAdmin;

impl AuthBackend for AlwaysAdmin {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<LoginResponse, RemoteError> {
        Ok(LoginResponse::new("admin-token", Principal::new("admin")))
    }

    async fn current_principal(&self, _token: &Token) -> Result<Principal, RemoteError> {
        Ok(Principal::new("admin"))
    }
}

#[tokio::test(start_paused = true)]
async fn aged_session_counts_down_to_logout() {
    let issued = BASE_MS - (23 * HOUR_MS + HOUR_MS / 2);
    let store = Arc::new(MemoryTokenStore::with_credential(Credential::new(
        "admin-token",
        issued,
    )));
    let toasts = Arc::new(Toasts::default());
    let router = Arc::new(History::default());
    let config = SessionConfig::new("http://backend.test/".parse().unwrap()).with_expiry(
        ExpiryPolicy {
            grace_delay: Duration::ZERO,
            ..ExpiryPolicy::default()
        },
    );
    let validator = SessionValidator::builder(AlwaysAdmin, store.clone(), config)
        .with_notifier(toasts.clone())
        .with_clock(Arc::new(PausedClock {
            start: tokio::time::Instant::now(),
        }))
        .build();

    let handle = SessionExpiryMonitor::new(validator, router.clone()).start();
    let mut rx = handle.subscribe();

    let warning = rx
        .wait_for(|s| matches!(s, MonitorState::Warning { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(
        warning,
        MonitorState::Warning {
            remaining_secs: 1800,
            acknowledged: false
        }
    );
    assert_eq!(
        toasts.seen(),
        vec![Notice::ExpiryWarning {
            remaining_secs: 1800
        }]
    );

    rx.wait_for(|s| *s == MonitorState::Expired).await.unwrap();
    assert!(store.load().is_none());
    assert_eq!(router.visited(), vec!["/login".to_string()]);
    assert_eq!(toasts.seen().last(), Some(&Notice::SessionTimedOut));
}
