//! rxdesk session - token lifecycle for the pharmacy admin client
//!
//! - [`SessionManager`] holds the access/refresh tokens and role metadata,
//!   mirrors them into a [`SessionStore`](rxdesk_core::SessionStore) and runs
//!   at most one refresh exchange at a time
//! - [`ApiClient`] attaches the bearer token and recovers from a 401 by
//!   refreshing once and replaying the request
//! - [`RouteGuard`] gates screens on authentication, role and account activity

pub mod client;
pub mod error;
pub mod guard;
pub mod manager;
pub mod store;
pub mod token;
pub mod transport;


pub use client::ApiClient;
pub use error::{SessionError, SessionResult};
pub use guard::{GuardOutcome, RouteGuard};
pub use manager::{Credentials, LogNavigator, LoginResponse, LoginUser, SessionManager};
pub use store::{build_store, FileStore, MemoryStore, NoopStore};
pub use token::{decode_claims, is_token_expired, seconds_until_expiry, TokenClaims};
pub use transport::{ApiRequest, ApiResponse, HttpMethod, ReqwestTransport, Transport};
