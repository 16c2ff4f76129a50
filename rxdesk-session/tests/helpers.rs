//! Local backend for end-to-end session tests
//!
//! Mimics the token endpoints of the pharmacy REST API on an ephemeral port.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rxdesk_core::{ApiConfig, AuthConfig, SessionStore};
use rxdesk_session::{ApiClient, ReqwestTransport, SessionManager};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

// Tracing is initialized once per test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

const REFRESH_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
pub struct BackendState {
    access: Mutex<Option<String>>,
    refresh: Mutex<Option<String>>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl BackendState {
    /// Invalidate the current access token; the refresh token stays valid
    pub fn expire_access(&self) {
        *self.access.lock().unwrap() = None;
    }

    pub fn revoke_refresh(&self) {
        *self.refresh.lock().unwrap() = None;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue_access(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("access-{n}");
        *self.access.lock().unwrap() = Some(token.clone());
        token
    }
}

pub struct TestApp {
    pub address: String,
    pub backend: Arc<BackendState>,
}

impl TestApp {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.address.clone(),
            timeout_seconds: 1,
            ..Default::default()
        }
    }

    /// Session manager and client wired to this backend over HTTP
    pub fn session(
        &self,
        store: Arc<dyn SessionStore>,
        redirects: Arc<Mutex<Vec<String>>>,
    ) -> (Arc<SessionManager>, ApiClient) {
        let transport =
            Arc::new(ReqwestTransport::new(&self.api_config()).expect("Failed to build transport"));
        let navigator = move |route: &str| redirects.lock().unwrap().push(route.to_string());

        let session = Arc::new(
            SessionManager::new(AuthConfig::default(), store, transport)
                .with_navigator(Arc::new(navigator)),
        );
        let client = ApiClient::new(Arc::clone(&session));
        (session, client)
    }
}

pub async fn spawn_app() -> TestApp {
    LazyLock::force(&TRACING);

    let backend = Arc::new(BackendState::default());
    let app = Router::new()
        .route("/api/login/", post(login))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/products/", get(products))
        .route("/api/slow/", get(slow))
        .with_state(Arc::clone(&backend));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        backend,
    }
}

fn unauthorized(detail: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body["username"] != "ana" || body["password"] != "secret" {
        return unauthorized("No active account found with the given credentials");
    }

    let access = state.issue_access();
    *state.refresh.lock().unwrap() = Some("refresh-1".to_string());

    Json(json!({
        "access": access,
        "refresh": "refresh-1",
        "user": {
            "id": 9,
            "username": "ana",
            "role": 3,
            "role_name": "Pharmacist",
            "is_active": true
        }
    }))
    .into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(REFRESH_DELAY).await;

    let valid = state.refresh.lock().unwrap().clone();
    match (body["refresh"].as_str(), valid) {
        (Some(presented), Some(valid)) if presented == valid => {
            Json(json!({ "access": state.issue_access() })).into_response()
        }
        _ => unauthorized("Token is invalid or expired"),
    }
}

fn authorized(state: &BackendState, headers: &HeaderMap) -> bool {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let current = state.access.lock().unwrap().clone();
    presented.is_some() && presented == current.as_deref()
}

async fn products(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized("Given token not valid for any token type");
    }
    Json(json!([
        { "id": 1, "name": "Paracetamol 500mg", "stock": 120 },
        { "id": 2, "name": "Ibuprofen 400mg", "stock": 0 }
    ]))
    .into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    StatusCode::OK.into_response()
}
