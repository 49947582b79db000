//! Configuration loading, validation, and the typed environment surface for
//! the sandbox orchestrator.
//!
//! Config files: none. Every setting is drawn from a closed set of
//! environment variables — there is no config file format to support.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::load_from_env,
    schema::{OrchestratorConfig, SandboxProvider},
    validate::{Diagnostic, Severity},
};
