//! Credential Broker: mints short-lived code-host installation tokens,
//! installs git auth into running containers with retry, and resolves the
//! best available auth for a given repo owner.

pub mod app_jwt;
pub mod broker;
pub mod container_auth;
pub mod error;
pub mod permissions;

pub use {
    app_jwt::mint_app_jwt,
    broker::{resolve_best_token, CredentialBroker, InstallationToken, ResolvedAuth},
    container_auth::{install_git_auth, refresh_git_auth},
    error::{Error, Result},
    permissions::{hydration_permissions, Level, Permissions},
};
