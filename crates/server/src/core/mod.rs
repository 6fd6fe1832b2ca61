//! Core Service Layer
//!
//! Shared infrastructure for the hub server: configuration, authentication,
//! request context, errors and the top-level router.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod dates;
pub mod error;
pub mod router;

// Re-exports for convenience
pub use config::{AppState, HubConfig};
pub use ctx::Ctx;
pub use error::{Error, Result};
pub use router::router;
