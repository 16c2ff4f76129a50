//! Session Manager - owner of the access/refresh tokens
//!
//! Keeps the session in memory, mirrors it into a [`SessionStore`], exchanges
//! refresh tokens and guarantees that at most one exchange is in flight. Every
//! caller that needs a fresh token while an exchange is running awaits the same
//! shared future instead of starting its own.

use futures::future::{BoxFuture, FutureExt, Shared};
use rxdesk_core::{
    store_keys, AuthConfig, Navigator, RoleMeta, SessionData, SessionEvent, SessionSnapshot,
    SessionStatus, SessionStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::guard::{GuardOutcome, RouteGuard};
use crate::token;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type SharedRefresh = Shared<BoxFuture<'static, SessionResult<String>>>;

const EVENT_CAPACITY: usize = 16;

/// Login credentials
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The `user` object of a login response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub role: i64,
    pub role_name: String,
    pub is_active: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl LoginUser {
    pub fn role_meta(&self) -> RoleMeta {
        RoleMeta {
            role_id: self.role,
            role_name: self.role_name.clone(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: LoginUser,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Navigator used when none is configured; only records the redirect in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Session ended, navigating to login");
    }
}

#[derive(Debug, Default)]
struct SessionState {
    data: SessionData,
    /// False until the in-memory copy has been loaded or written
    hydrated: bool,
}

pub struct SessionManager {
    auth: AuthConfig,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
    state: RwLock<SessionState>,
    /// Pending exchange tagged with the generation that started it
    in_flight: Mutex<Option<(u64, SharedRefresh)>>,
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        auth: AuthConfig,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            auth,
            store,
            transport,
            navigator: Arc::new(LogNavigator),
            state: RwLock::new(SessionState::default()),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    /// Hydrate from the store and report the resulting status
    pub fn init(&self) -> SessionStatus {
        self.load_tokens();
        let status = self.status();
        info!(%status, "Session initialized");
        status
    }

    /// Forget the in-memory session and any pending refresh; the store is untouched
    pub fn teardown(&self) {
        *self.write_state() = SessionState::default();
        self.lock_in_flight().take();
        debug!("Session torn down");
    }

    /// Load the session from the store; no-op when the store is unavailable
    pub fn load_tokens(&self) {
        if !self.store.is_available() {
            debug!("Session store unavailable, skipping hydration");
            return;
        }

        let data = read_store(self.store.as_ref());
        debug!(
            authenticated = data.is_authenticated(),
            "Hydrated session from store"
        );

        let mut state = self.write_state();
        state.data = data;
        state.hydrated = true;
    }

    /// Store a new token pair (and role metadata when given)
    pub fn set_tokens(&self, access: &str, refresh: &str, role: Option<RoleMeta>) {
        {
            let mut state = self.write_state();
            state.data.access_token = Some(access.to_string());
            state.data.refresh_token = Some(refresh.to_string());
            if let Some(role) = &role {
                state.data.role_id = Some(role.role_id);
                state.data.role_name = Some(role.role_name.clone());
                state.data.is_active = Some(role.is_active);
            }
            state.hydrated = true;
        }

        self.persist(store_keys::ACCESS, access);
        self.persist(store_keys::REFRESH, refresh);
        if let Some(role) = role {
            self.persist(store_keys::ROLE, &role.role_id.to_string());
            self.persist(store_keys::ROLE_NAME, &role.role_name);
            self.persist(store_keys::IS_ACTIVE, bool_str(role.is_active));
        }

        self.notify(SessionEvent::TokensSet);
    }

    /// Drop every session field, in memory and in the store
    pub fn clear_tokens(&self) {
        {
            let mut state = self.write_state();
            state.data = SessionData::default();
            state.hydrated = true;
        }

        for key in store_keys::ALL {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove session key from store");
            }
        }

        self.notify(SessionEvent::Cleared);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session; read straight from the store until hydrated
    pub fn current(&self) -> SessionData {
        let state = self.read_state();
        if state.hydrated {
            return state.data.clone();
        }
        drop(state);
        read_store(self.store.as_ref())
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current().refresh_token
    }

    pub fn role_id(&self) -> Option<i64> {
        self.current().role_id
    }

    pub fn role_name(&self) -> Option<String> {
        self.current().role_name
    }

    pub fn is_active(&self) -> Option<bool> {
        self.current().is_active
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_authenticated()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&self.current())
    }

    pub fn status(&self) -> SessionStatus {
        let refreshing = self.lock_in_flight().is_some();
        let data = self.current();

        match (refreshing, data.access_token.is_some()) {
            (true, true) => SessionStatus::Refreshing,
            (true, false) => SessionStatus::Authenticating,
            (false, _) if data.is_authenticated() => SessionStatus::Authenticated,
            (false, _) => SessionStatus::Unauthenticated,
        }
    }

    pub fn authorize(&self, guard: &RouteGuard) -> GuardOutcome {
        guard.check(&self.snapshot())
    }

    pub fn is_access_token_expired(&self) -> bool {
        token::is_token_expired(self.access_token().as_deref())
    }

    /// Exchange credentials for a token pair and start the session
    pub async fn login(&self, credentials: &Credentials) -> SessionResult<LoginResponse> {
        info!(username = %credentials.username, "Logging in");

        let request = ApiRequest::post(&self.auth.login_path).json(credentials)?;
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let message = error_detail(&response);
            warn!(status = response.status, %message, "Login rejected");
            return Err(SessionError::LoginFailed {
                status: response.status,
                message,
            });
        }

        let login: LoginResponse = response.json()?;
        self.set_tokens(&login.access, &login.refresh, Some(login.user.role_meta()));

        info!(
            role = login.user.role,
            role_name = %login.user.role_name,
            "Login succeeded"
        );
        Ok(login)
    }

    /// End the session and go to the login route
    pub fn logout(&self) {
        info!("Logging out");
        self.clear_tokens();
        self.navigator.navigate(&self.auth.login_route);
    }

    /// Exchange the refresh token for a new access token
    ///
    /// Concurrent callers share one exchange. A failed exchange clears the
    /// session and navigates to the login route once, and every caller gets
    /// the same error.
    pub async fn refresh_access_token(self: &Arc<Self>) -> SessionResult<String> {
        if self.refresh_token().is_none() {
            warn!("Refresh requested without a refresh token, ending session");
            self.end_session();
            return Err(SessionError::NoRefreshToken);
        }

        let pending = {
            let mut slot = self.lock_in_flight();
            match slot.as_ref() {
                Some((_, pending)) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let pending = Arc::clone(self).run_refresh(generation).boxed().shared();
                    *slot = Some((generation, pending.clone()));
                    pending
                }
            }
        };

        pending.await
    }

    /// Recover from a 401 on a request that was sent with `sent_with`
    ///
    /// If the session already holds a different access token, someone else
    /// refreshed in the meantime and that token is returned without a new
    /// exchange.
    pub(crate) async fn recover(self: &Arc<Self>, sent_with: Option<&str>) -> SessionResult<String> {
        let current = self.current();
        if current.is_authenticated() {
            if let Some(access) = current.access_token {
                if sent_with != Some(access.as_str()) {
                    debug!("Access token changed since the request was sent, replaying");
                    return Ok(access);
                }
            }
        }

        self.refresh_access_token().await
    }

    async fn run_refresh(self: Arc<Self>, generation: u64) -> SessionResult<String> {
        info!(generation, "Refreshing access token");

        let result = self.exchange_refresh_token().await;

        // A teardown may have abandoned this exchange and a newer one may own the slot
        let owned = {
            let mut slot = self.lock_in_flight();
            let owned = matches!(slot.as_ref(), Some((current, _)) if *current == generation);
            if owned {
                slot.take();
            }
            owned
        };

        match &result {
            // Cleared while the exchange was running; the clearing side already navigated
            Err(SessionError::NoRefreshToken) => {
                debug!(generation, "Session cleared during token refresh, discarding result");
            }
            Err(e) if owned => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session();
            }
            Err(e) => {
                debug!(generation, error = %e, "Abandoned token refresh failed");
            }
            Ok(_) => {}
        }

        result
    }

    async fn exchange_refresh_token(&self) -> SessionResult<String> {
        let refresh = self.refresh_token().ok_or(SessionError::NoRefreshToken)?;

        let request = ApiRequest::post(&self.auth.refresh_path).json(&RefreshRequest {
            refresh: &refresh,
        })?;

        let response =
            self.transport
                .send(request)
                .await
                .map_err(|e| SessionError::RefreshRejected {
                    status: e.status(),
                    message: e.to_string(),
                })?;

        if !response.is_success() {
            return Err(SessionError::RefreshRejected {
                status: Some(response.status),
                message: error_detail(&response),
            });
        }

        let payload: RefreshResponse =
            response
                .json()
                .map_err(|e| SessionError::RefreshRejected {
                    status: Some(response.status),
                    message: format!("Malformed refresh response: {}", e),
                })?;

        if payload.access.is_empty() {
            return Err(SessionError::RefreshRejected {
                status: Some(response.status),
                message: "Refresh response carried an empty access token".to_string(),
            });
        }

        self.store_refreshed(&payload.access, payload.refresh.as_deref())?;
        Ok(payload.access)
    }

    fn store_refreshed(&self, access: &str, refresh: Option<&str>) -> SessionResult<()> {
        {
            let mut state = self.write_state();
            // Logged out while the exchange was running; do not resurrect the session
            if state.data.refresh_token.is_none() {
                return Err(SessionError::NoRefreshToken);
            }
            state.data.access_token = Some(access.to_string());
            if let Some(refresh) = refresh {
                state.data.refresh_token = Some(refresh.to_string());
            }
            state.hydrated = true;
        }

        self.persist(store_keys::ACCESS, access);
        if let Some(refresh) = refresh {
            self.persist(store_keys::REFRESH, refresh);
        }

        debug!(rotated = refresh.is_some(), "Stored refreshed access token");
        self.notify(SessionEvent::Refreshed);
        Ok(())
    }

    fn end_session(&self) {
        self.clear_tokens();
        self.navigator.navigate(&self.auth.login_route);
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Failed to persist session key, keeping in-memory value");
        }
    }

    fn notify(&self, event: SessionEvent) {
        debug!(?event, "Session changed");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<(u64, SharedRefresh)>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_store(store: &dyn SessionStore) -> SessionData {
    SessionData {
        access_token: store.get(store_keys::ACCESS),
        refresh_token: store.get(store_keys::REFRESH),
        role_id: store
            .get(store_keys::ROLE)
            .and_then(|value| value.trim().parse().ok()),
        role_name: store.get(store_keys::ROLE_NAME),
        is_active: store
            .get(store_keys::IS_ACTIVE)
            .and_then(|value| match value.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            }),
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Best-effort human readable message from an error response
fn error_detail(response: &ApiResponse) -> String {
    if let Ok(body) = response.json::<Value>() {
        for key in ["detail", "message", "error"] {
            if let Some(message) = body.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let text = response.text();
    if text.trim().is_empty() {
        format!("HTTP {}", response.status)
    } else {
        text
    }
}
