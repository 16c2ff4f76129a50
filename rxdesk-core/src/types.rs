//! Core data type definitions

use serde::{Deserialize, Serialize};

/// Keys under which the session is mirrored in the persistent store
pub mod store_keys {
    pub const ACCESS: &str = "access";
    pub const REFRESH: &str = "refresh";
    pub const ROLE: &str = "role";
    pub const ROLE_NAME: &str = "role_name";
    pub const IS_ACTIVE: &str = "is_active";

    /// Every key the session owns, in write order
    pub const ALL: [&str; 5] = [ACCESS, REFRESH, ROLE, ROLE_NAME, IS_ACTIVE];
}

/// Role metadata kept alongside the tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMeta {
    pub role_id: i64,
    pub role_name: String,
    pub is_active: bool,
}

/// The authenticated session: tokens plus the role they were issued for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub is_active: Option<bool>,
}

impl SessionData {
    /// A session without a refresh token cannot recover and counts as signed out
    pub fn is_authenticated(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn role(&self) -> Option<RoleMeta> {
        Some(RoleMeta {
            role_id: self.role_id?,
            role_name: self.role_name.clone()?,
            is_active: self.is_active.unwrap_or(false),
        })
    }
}

/// Point-in-time copy of the session handed to guards and UI collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub is_active: Option<bool>,
}

impl From<&SessionData> for SessionSnapshot {
    fn from(data: &SessionData) -> Self {
        Self {
            is_authenticated: data.is_authenticated(),
            role_id: data.role_id,
            role_name: data.role_name.clone(),
            is_active: data.is_active,
        }
    }
}

/// Authentication state as observed by the rest of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unauthenticated,
    /// A refresh is in flight and no access token is held yet
    Authenticating,
    Authenticated,
    /// A refresh is in flight for an expired access token
    Refreshing,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Unauthenticated => write!(f, "unauthenticated"),
            SessionStatus::Authenticating => write!(f, "authenticating"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
            SessionStatus::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Session-changed notifications; consumers re-read state through the accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    TokensSet,
    Refreshed,
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_decides_authentication() {
        let mut data = SessionData {
            access_token: Some("a".to_string()),
            ..Default::default()
        };
        assert!(!data.is_authenticated());

        data.refresh_token = Some("r".to_string());
        assert!(data.is_authenticated());
        assert!(SessionSnapshot::from(&data).is_authenticated);
    }

    #[test]
    fn test_role_requires_id_and_name() {
        let mut data = SessionData {
            role_id: Some(2),
            ..Default::default()
        };
        assert!(data.role().is_none());

        data.role_name = Some("pharmacist".to_string());
        let role = data.role().unwrap();
        assert_eq!(role.role_id, 2);
        assert!(!role.is_active);
    }
}
