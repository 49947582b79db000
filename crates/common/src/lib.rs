//! Shared types, error definitions, and utilities used across the cmux-sandboxd
//! crates.

pub mod error;
pub mod ids;

pub use error::{Context, Error, FromMessage, Result};
pub use ids::{TeamId, UserId};
