//! Route guards
//!
//! Decide whether the current session may enter a screen, based on the
//! session snapshot only. Guards never call the backend.

use rxdesk_core::SessionSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of checking a guard against a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardOutcome {
    Allow,
    /// No usable session
    RedirectToLogin,
    /// Signed in, but the account is deactivated
    Inactive,
    /// Signed in with a role that may not enter
    Forbidden,
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allow)
    }
}

impl std::fmt::Display for GuardOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardOutcome::Allow => write!(f, "allow"),
            GuardOutcome::RedirectToLogin => write!(f, "redirect_to_login"),
            GuardOutcome::Inactive => write!(f, "inactive"),
            GuardOutcome::Forbidden => write!(f, "forbidden"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    /// `None` admits every role
    allowed_roles: Option<BTreeSet<i64>>,
    require_active: bool,
}

impl RouteGuard {
    /// Admit any signed-in session
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Restrict to the given role ids; repeated calls widen the set
    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = i64>) -> Self {
        self.allowed_roles
            .get_or_insert_with(BTreeSet::new)
            .extend(roles);
        self
    }

    /// Refuse accounts whose active flag is false or unknown
    pub fn require_active(mut self) -> Self {
        self.require_active = true;
        self
    }

    pub fn check(&self, session: &SessionSnapshot) -> GuardOutcome {
        if !session.is_authenticated {
            return GuardOutcome::RedirectToLogin;
        }

        if self.require_active && session.is_active != Some(true) {
            return GuardOutcome::Inactive;
        }

        match (&self.allowed_roles, session.role_id) {
            (None, _) => GuardOutcome::Allow,
            (Some(roles), Some(role)) if roles.contains(&role) => GuardOutcome::Allow,
            (Some(_), _) => GuardOutcome::Forbidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(role: Option<i64>, active: Option<bool>) -> SessionSnapshot {
        SessionSnapshot {
            is_authenticated: true,
            role_id: role,
            role_name: role.map(|r| format!("role-{r}")),
            is_active: active,
        }
    }

    #[test]
    fn test_signed_out_session_goes_to_login() {
        let signed_out = SessionSnapshot {
            is_authenticated: false,
            role_id: Some(1),
            role_name: None,
            is_active: Some(true),
        };
        assert_eq!(
            RouteGuard::authenticated().check(&signed_out),
            GuardOutcome::RedirectToLogin
        );
    }

    #[test]
    fn test_role_restriction() {
        let guard = RouteGuard::authenticated().allow_roles([1, 2]);
        assert_eq!(guard.check(&snapshot(Some(1), Some(true))), GuardOutcome::Allow);
        assert_eq!(
            guard.check(&snapshot(Some(3), Some(true))),
            GuardOutcome::Forbidden
        );
        assert_eq!(guard.check(&snapshot(None, Some(true))), GuardOutcome::Forbidden);

        let widened = guard.allow_roles([3]);
        assert!(widened.check(&snapshot(Some(3), None)).is_allowed());
    }

    #[test]
    fn test_inactive_accounts() {
        let guard = RouteGuard::authenticated().require_active();
        assert_eq!(guard.check(&snapshot(Some(1), Some(false))), GuardOutcome::Inactive);
        assert_eq!(guard.check(&snapshot(Some(1), None)), GuardOutcome::Inactive);
        assert!(guard.check(&snapshot(Some(1), Some(true))).is_allowed());

        // Activity is only enforced when asked for
        assert!(RouteGuard::authenticated()
            .check(&snapshot(Some(1), Some(false)))
            .is_allowed());
    }
}
