//! rxdesk core - shared data structures, traits and ambient plumbing
//!
//! Errors, configuration, logging and the session data model used by the
//! pharmacy admin client crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use tracing;
