//! Resolves the configured [`OrchestratorConfig`] into a concrete
//! [`SandboxInstance`] client, and dispatches by instance id for operations
//! that act on an existing instance rather than creating one.

use std::sync::Arc;

use cmux_config::{OrchestratorConfig, SandboxProvider};

use crate::{
    error::{Error, Result},
    instance::provider_from_instance_id,
    morph::MorphVmProvider,
    pve_lxc::PveLxcProvider,
    trait_def::SandboxInstance,
};

/// Fixed API origin for the microVM cloud. Unlike the self-hosted back-end,
/// its endpoint is not operator-configurable.
pub const MORPH_API_BASE_URL: &str = "https://cloud.morph.so/api";

/// Holds one client per configured provider and routes calls to the right
/// one. Built once at startup from [`OrchestratorConfig`].
pub struct ProviderRegistry {
    morph: Option<Arc<dyn SandboxInstance>>,
    pve_lxc: Option<Arc<dyn SandboxInstance>>,
    default: Option<SandboxProvider>,
}

impl ProviderRegistry {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let morph = config.morph.as_ref().map(|creds| {
            Arc::new(MorphVmProvider::new(MORPH_API_BASE_URL, creds.api_key.clone()))
                as Arc<dyn SandboxInstance>
        });
        let pve_lxc = config.pve_lxc.as_ref().map(|creds| {
            Arc::new(PveLxcProvider::new(creds.endpoint.clone(), creds.token.clone()))
                as Arc<dyn SandboxInstance>
        });
        Self {
            morph,
            pve_lxc,
            default: config.active_provider(),
        }
    }

    /// The client for an explicitly-known provider, e.g. one stored
    /// alongside an existing environment rather than detected from an
    /// instance id or read off the current default.
    pub fn client_for(&self, provider: SandboxProvider) -> Result<&Arc<dyn SandboxInstance>> {
        match provider {
            SandboxProvider::Morph => self.morph.as_ref(),
            SandboxProvider::PveLxc => self.pve_lxc.as_ref(),
        }
        .ok_or_else(|| Error::message(format!("no credentials configured for provider {provider}")))
    }

    /// The client to start a *new* instance on: the configured override, or
    /// whichever provider has credentials.
    pub fn default_client(&self) -> Result<&Arc<dyn SandboxInstance>> {
        let provider = self
            .default
            .ok_or_else(|| Error::message("no sandbox provider is configured"))?;
        self.client_for(provider)
    }

    /// The client that owns an existing instance, detected from its id
    /// prefix.
    pub fn client_for_instance(&self, instance_id: &str) -> Result<&Arc<dyn SandboxInstance>> {
        let provider = provider_from_instance_id(instance_id)
            .ok_or_else(|| Error::message(format!("cannot determine provider for instance id '{instance_id}'")))?;
        self.client_for(provider)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use cmux_config::schema::{LogFormat, MorphCredentials, PveLxcCredentials};

    use super::*;

    fn base_config() -> OrchestratorConfig {
        OrchestratorConfig {
            provider_override: None,
            morph: None,
            pve_lxc: None,
            code_host: None,
            vault_secret: None,
            task_run_jwt_secret: None,
            database_url: "sqlite://test.db".into(),
            bind_addr: "0.0.0.0:0".into(),
            log_format: LogFormat::Pretty,
            protected_template_vmids: Vec::new(),
        }
    }

    #[test]
    fn default_client_fails_with_no_credentials() {
        let registry = ProviderRegistry::from_config(&base_config());
        assert!(registry.default_client().is_err());
    }

    #[test]
    fn default_client_resolves_the_autodetected_provider() {
        let mut config = base_config();
        config.morph = Some(MorphCredentials {
            api_key: Secret::new("k".into()),
        });
        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.default_client().unwrap().provider(), SandboxProvider::Morph);
    }

    #[test]
    fn client_for_instance_routes_by_id_prefix() {
        let mut config = base_config();
        config.pve_lxc = Some(PveLxcCredentials {
            endpoint: "https://pve.local".into(),
            token: Secret::new("t".into()),
        });
        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(
            registry.client_for_instance("pvelxc-abc").unwrap().provider(),
            SandboxProvider::PveLxc
        );
    }

    #[test]
    fn client_for_instance_fails_when_credentials_missing_for_detected_provider() {
        let registry = ProviderRegistry::from_config(&base_config());
        assert!(registry.client_for_instance("morphvm_abc").is_err());
    }
}
