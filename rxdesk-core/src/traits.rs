//! Core trait definitions
//!
//! Seams between the session layer and its environment: the persistent
//! key/value store and the navigation hook used for the login redirect.

use crate::error::RxdeskResult;

/// String key/value store the session is mirrored into
///
/// Implementations must be cheap to call from async code; none of the
/// operations are expected to block for long.
pub trait SessionStore: Send + Sync {
    /// Read a value, `None` when the key is absent or the store is unavailable
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> RxdeskResult<()>;

    /// Remove a key; removing an absent key succeeds
    fn remove(&self, key: &str) -> RxdeskResult<()>;

    /// Whether this store is backed by real persistence
    fn is_available(&self) -> bool {
        true
    }
}

/// Full navigation to a route, discarding any in-memory view state
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, route: &str) {
        self(route)
    }
}
