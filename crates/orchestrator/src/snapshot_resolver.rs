//! Snapshot Resolver (component C): maps `(team, environmentId?,
//! snapshotId?)` to `(provider, snapshotId, templateVmid?, …)`.

use cmux_config::{OrchestratorConfig, SandboxProvider};
use cmux_store::MetadataStore;

use crate::error::{OrchestratorError, Result};

/// One entry of the known-defaults table: a provider-default snapshot a
/// tenant may always start from without owning it.
#[derive(Debug, Clone)]
pub struct KnownDefaultSnapshot {
    pub snapshot_id: String,
    pub provider: SandboxProvider,
}

/// Everything a start request needs to proceed past snapshot resolution.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    pub snapshot_id: String,
    pub template_vmid: Option<i64>,
    pub provider: SandboxProvider,
    pub data_vault_key: Option<String>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
    pub selected_repos: Vec<String>,
}

pub struct SnapshotResolver<'a> {
    store: &'a MetadataStore,
    config: &'a OrchestratorConfig,
    known_defaults: &'a [KnownDefaultSnapshot],
}

impl<'a> SnapshotResolver<'a> {
    pub fn new(
        store: &'a MetadataStore,
        config: &'a OrchestratorConfig,
        known_defaults: &'a [KnownDefaultSnapshot],
    ) -> Self {
        Self {
            store,
            config,
            known_defaults,
        }
    }

    fn known_default(&self, snapshot_id: &str) -> Option<&KnownDefaultSnapshot> {
        self.known_defaults.iter().find(|d| d.snapshot_id == snapshot_id)
    }

    fn active_provider(&self) -> Result<SandboxProvider> {
        self.config.active_provider().ok_or(OrchestratorError::NotConfigured)
    }

    pub async fn resolve(
        &self,
        caller_user_id: &str,
        team_id: &str,
        environment_id: Option<&str>,
        snapshot_id: Option<&str>,
    ) -> Result<ResolvedSnapshot> {
        if !self.store.is_team_member(team_id, caller_user_id).await? {
            return Err(OrchestratorError::Forbidden);
        }

        if let Some(environment_id) = environment_id {
            return self.resolve_from_environment(team_id, environment_id).await;
        }

        if let Some(snapshot_id) = snapshot_id {
            return self.resolve_from_snapshot_id(team_id, snapshot_id).await;
        }

        self.resolve_provider_default()
    }

    async fn resolve_from_environment(&self, team_id: &str, environment_id: &str) -> Result<ResolvedSnapshot> {
        let env = self
            .store
            .get_environment(environment_id)
            .await?
            .ok_or(OrchestratorError::NotFound)?;
        if env.team_id != team_id {
            return Err(OrchestratorError::Forbidden);
        }

        // Environment's recorded `snapshotProvider` dominates over prefix
        // inference, which dominates over active configuration.
        let provider = match SandboxProvider::parse(&env.snapshot_provider) {
            Some(provider) => provider,
            None => match cmux_providers::provider_from_instance_id(&env.snapshot_id) {
                Some(provider) => provider,
                None => self.active_provider()?,
            },
        };

        Ok(ResolvedSnapshot {
            snapshot_id: env.snapshot_id,
            template_vmid: env.template_vmid,
            provider,
            data_vault_key: env.data_vault_key,
            maintenance_script: env.maintenance_script,
            dev_script: env.dev_script,
            selected_repos: env.selected_repos,
        })
    }

    async fn resolve_from_snapshot_id(&self, team_id: &str, snapshot_id: &str) -> Result<ResolvedSnapshot> {
        if let Some(default) = self.known_default(snapshot_id) {
            return Ok(ResolvedSnapshot {
                snapshot_id: default.snapshot_id.clone(),
                template_vmid: None,
                provider: default.provider,
                data_vault_key: None,
                maintenance_script: None,
                dev_script: None,
                selected_repos: Vec::new(),
            });
        }

        for env in self.store.list_environments(team_id).await? {
            if env.snapshot_id == snapshot_id {
                return self.resolve_from_environment(team_id, &env.id).await;
            }
        }

        let provider_hint = cmux_providers::provider_from_instance_id(snapshot_id);
        if let Some(version) = self
            .store
            .find_snapshot_version_by_snapshot_id(snapshot_id, provider_hint.map(|p| p.to_string()).as_deref())
            .await?
        {
            let env = self
                .store
                .get_environment(&version.environment_id)
                .await?
                .ok_or(OrchestratorError::Forbidden)?;
            if env.team_id != team_id {
                return Err(OrchestratorError::Forbidden);
            }
            return Ok(ResolvedSnapshot {
                snapshot_id: version.snapshot_id,
                template_vmid: version.template_vmid,
                provider: SandboxProvider::parse(&version.snapshot_provider).unwrap_or(self.active_provider()?),
                data_vault_key: env.data_vault_key,
                maintenance_script: version.maintenance_script,
                dev_script: version.dev_script,
                selected_repos: env.selected_repos,
            });
        }

        Err(OrchestratorError::Forbidden)
    }

    fn resolve_provider_default(&self) -> Result<ResolvedSnapshot> {
        let provider = self.active_provider()?;
        let default = self
            .known_defaults
            .iter()
            .find(|d| d.provider == provider)
            .ok_or(OrchestratorError::NotConfigured)?;
        Ok(ResolvedSnapshot {
            snapshot_id: default.snapshot_id.clone(),
            template_vmid: None,
            provider,
            data_vault_key: None,
            maintenance_script: None,
            dev_script: None,
            selected_repos: Vec::new(),
        })
    }
}
