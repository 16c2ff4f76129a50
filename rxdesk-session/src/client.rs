//! Authenticated API client
//!
//! Attaches the bearer token to outbound requests and recovers from a single
//! 401 per request by refreshing the access token and replaying once.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};
use crate::manager::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, Transport};

#[derive(Clone)]
pub struct ApiClient {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    /// Client sharing the session manager's transport
    pub fn new(session: Arc<SessionManager>) -> Self {
        let transport = session.transport();
        Self { session, transport }
    }

    pub fn with_transport(session: Arc<SessionManager>, transport: Arc<dyn Transport>) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Send a request, refreshing and replaying once on 401
    pub async fn execute(&self, request: ApiRequest) -> SessionResult<ApiResponse> {
        let sent_with = self.session.access_token();
        let response = self.send(request.clone(), sent_with.as_deref()).await?;

        if !response.is_unauthorized() {
            return response.error_for_status();
        }

        if request.is_retry() {
            warn!(path = %request.path, "Replayed request still unauthorized");
            return response.error_for_status();
        }

        match self.session.recover(sent_with.as_deref()).await {
            Ok(token) => {
                debug!(method = %request.method, path = %request.path, "Replaying request with refreshed token");
                self.send(request.into_retry(), Some(token.as_str()))
                    .await?
                    .error_for_status()
            }
            // Session already cleared and redirected; surface the original 401
            Err(SessionError::NoRefreshToken) => response.error_for_status(),
            Err(e) => Err(e),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> SessionResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::post(path).json(body)?)
            .await?
            .json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> SessionResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::put(path).json(body)?)
            .await?
            .json()
    }

    pub async fn delete(&self, path: &str) -> SessionResult<()> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    async fn send(&self, request: ApiRequest, token: Option<&str>) -> SessionResult<ApiResponse> {
        let request = match token {
            Some(token) => request.with_bearer(token),
            None => request,
        };
        self.transport.send(request).await
    }
}
