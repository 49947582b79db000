use secrecy::Secret;
use tracing::warn;

use crate::schema::{
    CodeHostAppCredentials, LogFormat, MorphCredentials, OrchestratorConfig, PveLxcCredentials,
    SandboxProvider,
};

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Load configuration from the closed set of recognized environment
/// variables. Never fails outright — an unset or malformed optional
/// variable just leaves the corresponding field `None`; callers should run
/// [`crate::validate::validate`] afterwards to surface the consequences.
pub fn load_from_env() -> OrchestratorConfig {
    let provider_override = match env("CMUX_SANDBOX_PROVIDER") {
        Some(raw) => match SandboxProvider::parse(&raw) {
            Some(p) => Some(p),
            None => {
                warn!(
                    value = %raw,
                    fallback = %crate::schema::DEFAULT_SANDBOX_PROVIDER,
                    "unrecognized CMUX_SANDBOX_PROVIDER value, falling back to default"
                );
                Some(crate::schema::DEFAULT_SANDBOX_PROVIDER)
            },
        },
        None => None,
    };

    let morph = env("MORPH_API_KEY").map(|api_key| MorphCredentials {
        api_key: Secret::new(api_key),
    });

    let pve_lxc = match (env("PVE_LXC_ENDPOINT"), env("PVE_LXC_TOKEN")) {
        (Some(endpoint), Some(token)) => Some(PveLxcCredentials {
            endpoint,
            token: Secret::new(token),
        }),
        (Some(_), None) | (None, Some(_)) => {
            warn!("PVE_LXC_ENDPOINT and PVE_LXC_TOKEN must both be set; ignoring partial pve-lxc configuration");
            None
        },
        (None, None) => None,
    };

    let code_host = match (env("GITHUB_APP_ID"), env("GITHUB_APP_PRIVATE_KEY")) {
        (Some(app_id), Some(pem)) => Some(CodeHostAppCredentials {
            app_id,
            private_key_pem: Secret::new(pem),
        }),
        (Some(_), None) | (None, Some(_)) => {
            warn!("GITHUB_APP_ID and GITHUB_APP_PRIVATE_KEY must both be set; ignoring partial code-host app configuration");
            None
        },
        (None, None) => None,
    };

    let vault_secret = env("CMUX_VAULT_SECRET").map(Secret::new);
    let task_run_jwt_secret = env("CMUX_TASK_RUN_JWT_SECRET").map(Secret::new);

    let database_url =
        env("CMUX_DATABASE_URL").unwrap_or_else(|| "sqlite://cmux-sandboxd.db".to_string());
    let bind_addr = env("CMUX_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:7777".to_string());

    let log_format = match env("CMUX_LOG_FORMAT").as_deref() {
        Some("json") => LogFormat::Json,
        Some(other) if other != "pretty" => {
            warn!(value = other, "unrecognized CMUX_LOG_FORMAT, falling back to pretty");
            LogFormat::Pretty
        },
        _ => LogFormat::Pretty,
    };

    let protected_template_vmids = env("CMUX_PROTECTED_TEMPLATE_VMIDS")
        .map(|raw| {
            raw.split(',')
                .filter_map(|part| part.trim().parse::<i64>().ok())
                .collect()
        })
        .unwrap_or_default();

    OrchestratorConfig {
        provider_override,
        morph,
        pve_lxc,
        code_host,
        vault_secret,
        task_run_jwt_secret,
        database_url,
        bind_addr,
        log_format,
        protected_template_vmids,
    }
}
