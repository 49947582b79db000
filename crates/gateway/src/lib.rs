//! HTTP control-plane surface for sandbox lifecycle and environment
//! management.
//!
//! Startup sequence:
//! 1. Load and validate configuration.
//! 2. Connect the metadata store, secret vault, provider registry, and
//!    credential broker; assemble them into [`state::AppState`].
//! 3. Build the router via [`server::build_router`] and bind it to the
//!    configured address.
//! 4. Serve until a shutdown signal arrives.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::build_router;
pub use state::AppState;
