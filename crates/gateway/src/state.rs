//! Shared services handed to every route handler through axum's `State`
//! extractor. Holds no request-scoped data — `cmux_store::MetadataStore` is
//! already a cheap `Clone` over a pooled connection, so the rest of the
//! struct follows its lead and wraps the remaining singletons in `Arc`.

use std::sync::Arc;

use cmux_config::OrchestratorConfig;
use cmux_credentials::CredentialBroker;
use cmux_orchestrator::KnownDefaultSnapshot;
use cmux_providers::ProviderRegistry;
use cmux_store::MetadataStore;
use cmux_vault::SecretVault;

/// Everything the `/sandboxes/*` and `/environments/*` handlers need, built
/// once at startup and shared across every request.
#[derive(Clone)]
pub struct AppState {
    pub store: MetadataStore,
    pub vault: Arc<SecretVault>,
    pub config: Arc<OrchestratorConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub credential_broker: Arc<CredentialBroker>,
    pub known_defaults: Arc<Vec<KnownDefaultSnapshot>>,
}

impl AppState {
    pub fn new(
        store: MetadataStore,
        vault: SecretVault,
        config: OrchestratorConfig,
        registry: ProviderRegistry,
        credential_broker: CredentialBroker,
        known_defaults: Vec<KnownDefaultSnapshot>,
    ) -> Self {
        Self {
            store,
            vault: Arc::new(vault),
            config: Arc::new(config),
            registry: Arc::new(registry),
            credential_broker: Arc::new(credential_broker),
            known_defaults: Arc::new(known_defaults),
        }
    }

    pub fn lifecycle(&self) -> cmux_orchestrator::LifecycleController<'_> {
        cmux_orchestrator::LifecycleController::new(
            &self.store,
            &self.vault,
            &self.config,
            &self.registry,
            &self.credential_broker,
            &self.known_defaults,
        )
    }

    pub fn authorizer(&self) -> cmux_orchestrator::Authorizer<'_> {
        cmux_orchestrator::Authorizer::new(&self.store)
    }
}
