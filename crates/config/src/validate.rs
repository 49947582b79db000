//! Non-fatal configuration diagnostics, surfaced to the operator at startup
//! without preventing the process from booting.

use std::fmt;

use crate::schema::OrchestratorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Validate a loaded config, producing diagnostics for issues that don't
/// prevent startup but that an operator should see (e.g. a configured
/// provider with no credentials — requests against it will 503).
pub fn validate(config: &OrchestratorConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    match config.active_provider() {
        None => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message: "no sandbox provider configured: set CMUX_SANDBOX_PROVIDER or provider credentials".into(),
        }),
        Some(provider) if !config.has_credentials_for(provider) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                message: format!(
                    "active provider {provider} has no credentials configured; start requests will fail with 503"
                ),
            });
        },
        _ => {},
    }

    if config.code_host.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: "no code-host app credentials configured; installation-token minting will be unavailable and the broker will fall back to user OAuth or public-read access".into(),
        });
    }

    if config.vault_secret.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: "CMUX_VAULT_SECRET is unset; the secret vault will run with an ephemeral key and cannot survive a restart".into(),
        });
    }

    if config.task_run_jwt_secret.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: "CMUX_TASK_RUN_JWT_SECRET is unset; image-upload verification will not be configured for started sandboxes".into(),
        });
    }

    diagnostics
}
