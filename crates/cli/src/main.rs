mod db_commands;

use clap::{Parser, Subcommand};
use cmux_config::{LogFormat as ConfigLogFormat, OrchestratorConfig, SandboxProvider, Severity};
use cmux_credentials::CredentialBroker;
use cmux_gateway::{AppState, build_router};
use cmux_orchestrator::KnownDefaultSnapshot;
use cmux_providers::ProviderRegistry;
use cmux_store::MetadataStore;
use cmux_vault::SecretVault;
use base64::Engine;
use rand::RngCore;
use secrecy::ExposeSecret;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cmux-sandboxd", about = "Multi-tenant sandbox orchestrator control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error); overridden by RUST_LOG if set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default when no subcommand is given).
    Serve,
    /// Print resolved configuration and non-fatal diagnostics, then exit.
    Doctor,
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

/// Initialise tracing, honoring `RUST_LOG` if set and otherwise falling back
/// to `--log-level`; JSON framing is driven by `CMUX_LOG_FORMAT` since that's
/// a property of the running process, not of this invocation.
fn init_telemetry(log_level: &str, log_format: ConfigLogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        ConfigLogFormat::Json => {
            registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
        }
        ConfigLogFormat::Pretty => {
            registry
                .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
                .init();
        }
    }
}

fn print_diagnostics(config: &OrchestratorConfig) {
    for diagnostic in cmux_config::validate::validate(config) {
        match diagnostic.severity {
            Severity::Error => tracing::error!(message = %diagnostic.message, "configuration error"),
            Severity::Warning => warn!(message = %diagnostic.message, "configuration warning"),
        }
    }
}

/// `snapshotId:provider,snapshotId:provider,...` — the operator-maintained
/// table of provider-default snapshots any tenant may start from without
/// owning them. Unrecognized provider tags are skipped with a warning rather
/// than failing startup, same tolerance as the rest of `cmux-config`'s
/// environment surface.
fn load_known_defaults() -> Vec<KnownDefaultSnapshot> {
    std::env::var("CMUX_KNOWN_DEFAULT_SNAPSHOTS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (snapshot_id, provider) = entry.split_once(':')?;
            match SandboxProvider::parse(provider) {
                Some(provider) => Some(KnownDefaultSnapshot {
                    snapshot_id: snapshot_id.to_string(),
                    provider,
                }),
                None => {
                    warn!(entry, "unrecognized provider tag in CMUX_KNOWN_DEFAULT_SNAPSHOTS, skipping");
                    None
                }
            }
        })
        .collect()
}

/// Master key for the secret vault. Falls back to a random, process-lifetime
/// key when `CMUX_VAULT_SECRET` is unset so the process can still boot in
/// development; `validate()` already surfaces a warning for this case.
fn vault_secret(config: &OrchestratorConfig) -> String {
    match &config.vault_secret {
        Some(secret) => secret.expose_secret().clone(),
        None => {
            let mut bytes = [0u8; 32];
            rand::rng().fill_bytes(&mut bytes);
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
    }
}

async fn build_state(config: OrchestratorConfig) -> anyhow::Result<AppState> {
    let store = MetadataStore::connect(&config.database_url).await?;
    let vault = SecretVault::new(store.pool().clone(), &vault_secret(&config)).await?;
    let registry = ProviderRegistry::from_config(&config);
    let credential_broker = CredentialBroker::new(config.code_host.clone());
    let known_defaults = load_known_defaults();

    Ok(AppState::new(store, vault, config, registry, credential_broker, known_defaults))
}

async fn serve() -> anyhow::Result<()> {
    let config = cmux_config::load_from_env();
    print_diagnostics(&config);

    let bind_addr = config.bind_addr.clone();
    let state = build_state(config).await?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "cmux-sandboxd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, draining in-flight requests");
        })
        .await?;

    Ok(())
}

async fn doctor() -> anyhow::Result<()> {
    let config = cmux_config::load_from_env();

    println!("database_url:    {}", config.database_url);
    println!("bind_addr:       {}", config.bind_addr);
    println!(
        "active_provider: {}",
        config.active_provider().map(|p| p.to_string()).unwrap_or_else(|| "none".to_string())
    );
    println!("code_host_app:   {}", if config.code_host.is_some() { "configured" } else { "absent" });
    println!("vault_secret:    {}", if config.vault_secret.is_some() { "configured" } else { "ephemeral" });

    let diagnostics = cmux_config::validate::validate(&config);
    if diagnostics.is_empty() {
        println!("\nno diagnostics");
    } else {
        println!();
        for diagnostic in diagnostics {
            println!("[{}] {}", diagnostic.severity, diagnostic.message);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_format = match std::env::var("CMUX_LOG_FORMAT").as_deref() {
        Ok("json") => ConfigLogFormat::Json,
        _ => ConfigLogFormat::Pretty,
    };
    init_telemetry(&cli.log_level, log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "cmux-sandboxd starting");

    match cli.command {
        None | Some(Commands::Serve) => serve().await,
        Some(Commands::Doctor) => doctor().await,
        Some(Commands::Db { action }) => db_commands::handle_db(action).await,
    }
}
