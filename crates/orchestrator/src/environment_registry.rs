//! Environment Registry (component F): environment CRUD and snapshot
//! versioning.

use cmux_config::{OrchestratorConfig, SandboxProvider};
use cmux_providers::{ExecOpts, SandboxInstance};
use cmux_store::{
    environments::NewEnvironment,
    models::{Environment, SnapshotVersion},
    snapshots::NewSnapshotVersion,
    MetadataStore,
};
use cmux_vault::SecretVault;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{OrchestratorError, Result},
    port_publisher::canonicalize_desired_ports,
};

/// Dev ports force-killed before every snapshot.
const KNOWN_DEV_PORTS: &[u16] = &[3000, 3001, 3002, 3003, 4000, 5000, 5173, 5174, 8000, 8080, 8888];

/// Runs the snapshot-cleanup command bundle inside the instance: kill user
/// terminal sessions and their processes, kill common dev-server processes,
/// force-kill listeners on the known dev ports, unset git identity and
/// credential helper, log out the code-host CLI, remove browser
/// single-instance lock files.
///
/// Append-only: order is processes -> credentials -> browser locks, and new
/// steps must be appended rather than interleaved.
pub async fn run_snapshot_cleanup(sandbox: &dyn SandboxInstance, instance_id: &str) -> Result<()> {
    let port_kills: String = KNOWN_DEV_PORTS
        .iter()
        .map(|port| format!("fuser -k {port}/tcp 2>/dev/null; "))
        .collect();

    let script = format!(
        "for session in $(cmux-terminal-server list-sessions 2>/dev/null); do \
           pid=$(cmux-terminal-server session-pid \"$session\" 2>/dev/null); \
           [ -n \"$pid\" ] && kill \"$pid\" 2>/dev/null; \
           cmux-terminal-server delete-session \"$session\" 2>/dev/null; \
         done; \
         tmux kill-session -t cmux 2>/dev/null; \
         pkill -f '(^|/)(node|bun|vite|esbuild|next|python3?)(\\s|$)' 2>/dev/null; \
         {port_kills} \
         git config --global --unset user.name 2>/dev/null; \
         git config --global --unset user.email 2>/dev/null; \
         git config --global --unset credential.helper 2>/dev/null; \
         gh auth logout 2>/dev/null; \
         rm -f ~/.config/google-chrome/SingletonLock ~/.config/google-chrome/SingletonCookie \
               ~/.config/chromium/SingletonLock ~/.config/chromium/SingletonCookie; \
         true"
    );

    let outcome = sandbox.exec(instance_id, &script, &ExecOpts::default()).await?;
    if outcome.exit_code != 0 {
        warn!(instance_id, exit_code = outcome.exit_code, "snapshot cleanup bundle reported a non-zero exit");
    }
    Ok(())
}

fn infer_provider(instance_id: &str) -> Result<SandboxProvider> {
    cmux_providers::provider_from_instance_id(instance_id).ok_or(OrchestratorError::BadRequest(
        "instance id does not match any known provider prefix".to_string(),
    ))
}

pub struct CreateEnvironmentRequest {
    pub name: String,
    pub instance_id: String,
    pub env_vars_content: String,
    pub selected_repos: Vec<String>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
    pub exposed_ports: Vec<u16>,
    pub created_by_user_id: String,
}

/// `(name, instanceId, envVarsContent, selectedRepos?, maintenanceScript?,
/// devScript?, exposedPorts?)` -> a new environment.
pub async fn create_environment(
    store: &MetadataStore,
    vault: &SecretVault,
    sandbox: &dyn SandboxInstance,
    config: &OrchestratorConfig,
    team_id: &str,
    caller_user_id: &str,
    request: CreateEnvironmentRequest,
) -> Result<Environment> {
    if !store.is_team_member(team_id, caller_user_id).await? {
        return Err(OrchestratorError::Forbidden);
    }

    let active_provider = config.active_provider().ok_or(OrchestratorError::NotConfigured)?;
    let inferred = infer_provider(&request.instance_id)?;
    if inferred != active_provider {
        return Err(OrchestratorError::Forbidden);
    }

    let ports = canonicalize_desired_ports(request.exposed_ports);

    let vault_key = format!("env_{}", Uuid::new_v4().simple());
    vault.set_value("env-blobs", &vault_key, &request.env_vars_content).await?;

    let instance = sandbox.get(&request.instance_id).await?;
    if instance.status != cmux_providers::InstanceStatus::Ready {
        sandbox.resume(&request.instance_id).await?;
    }
    run_snapshot_cleanup(sandbox, &request.instance_id).await?;
    let snapshot = sandbox.snapshot(&request.instance_id).await?;

    let environment = store
        .create_environment(NewEnvironment {
            team_id: team_id.to_string(),
            name: request.name,
            snapshot_id: snapshot.snapshot_id,
            snapshot_provider: active_provider.to_string(),
            template_vmid: snapshot.template_vmid,
            data_vault_key: Some(vault_key),
            selected_repos: request.selected_repos,
            maintenance_script: request.maintenance_script,
            dev_script: request.dev_script,
            exposed_ports: ports.iter().map(|&p| p as i64).collect(),
        })
        .await?;

    Ok(environment)
}

pub struct CreateSnapshotVersionRequest {
    pub instance_id: String,
    pub label: Option<String>,
    pub activate: bool,
}

/// Appends a new version with `version = max(existing)+1`, running the
/// same cleanup-then-snapshot sequence as environment creation.
pub async fn create_snapshot_version(
    store: &MetadataStore,
    sandbox: &dyn SandboxInstance,
    team_id: &str,
    caller_user_id: &str,
    environment_id: &str,
    request: CreateSnapshotVersionRequest,
) -> Result<SnapshotVersion> {
    let env = store
        .get_environment(environment_id)
        .await?
        .ok_or(OrchestratorError::NotFound)?;
    if env.team_id != team_id {
        return Err(OrchestratorError::Forbidden);
    }

    run_snapshot_cleanup(sandbox, &request.instance_id).await?;
    let snapshot = sandbox.snapshot(&request.instance_id).await?;

    store
        .create_snapshot_version(NewSnapshotVersion {
            environment_id: environment_id.to_string(),
            snapshot_id: snapshot.snapshot_id,
            snapshot_provider: sandbox.provider().to_string(),
            template_vmid: snapshot.template_vmid,
            created_by_user_id: caller_user_id.to_string(),
            label: request.label,
            activate: request.activate,
            maintenance_script: env.maintenance_script,
            dev_script: env.dev_script,
        })
        .await
        .map_err(Into::into)
}

/// `isActive=true` on the target, cleared on siblings, in one
/// transactional mutation at the store layer.
pub async fn activate_version(
    store: &MetadataStore,
    team_id: &str,
    environment_id: &str,
    version_id: &str,
) -> Result<SnapshotVersion> {
    let env = store
        .get_environment(environment_id)
        .await?
        .ok_or(OrchestratorError::NotFound)?;
    if env.team_id != team_id {
        return Err(OrchestratorError::Forbidden);
    }
    store.activate_snapshot_version(version_id).await.map_err(Into::into)
}

/// Loads all snapshot versions; for the self-hosted provider, gathers every
/// `templateVmid` (including the environment's own) and deletes each one not
/// reserved or explicitly protected, treating 404s as non-fatal. Any other
/// per-template failure aborts without deleting the environment record.
pub async fn delete_environment(
    store: &MetadataStore,
    sandbox: &dyn SandboxInstance,
    config: &OrchestratorConfig,
    team_id: &str,
    environment_id: &str,
) -> Result<()> {
    let env = store
        .get_environment(environment_id)
        .await?
        .ok_or(OrchestratorError::NotFound)?;
    if env.team_id != team_id {
        return Err(OrchestratorError::Forbidden);
    }

    if sandbox.provider() == SandboxProvider::PveLxc {
        let versions = store.list_snapshot_versions(environment_id).await?;
        let mut vmids: Vec<i64> = versions.iter().filter_map(|v| v.template_vmid).collect();
        vmids.extend(env.template_vmid);
        vmids.sort_unstable();
        vmids.dedup();

        for vmid in vmids {
            if !config.is_deletable_template_vmid(vmid) {
                continue;
            }
            sandbox.delete_template(vmid).await?;
        }
    }

    store.remove_environment(environment_id).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cmux_providers::{ExecOutcome, Instance, InstanceStatus, Result as ProviderResult, SnapshotResult, StartRequest};

    use super::*;

    struct FakeSandbox {
        provider: SandboxProvider,
        deleted: std::sync::Mutex<Vec<i64>>,
    }

    impl FakeSandbox {
        fn new(provider: SandboxProvider) -> Self {
            Self {
                provider,
                deleted: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SandboxInstance for FakeSandbox {
        fn provider(&self) -> SandboxProvider {
            self.provider
        }

        async fn get(&self, id: &str) -> ProviderResult<Instance> {
            Ok(Instance {
                id: id.to_string(),
                status: InstanceStatus::Ready,
                metadata: Default::default(),
                http_services: Vec::new(),
            })
        }

        async fn start(&self, _request: StartRequest) -> ProviderResult<Instance> {
            unreachable!()
        }

        async fn exec(&self, _id: &str, _command: &str, _opts: &ExecOpts) -> ProviderResult<ExecOutcome> {
            Ok(ExecOutcome {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        async fn expose_http_service(&self, _id: &str, _name: &str, _port: u16) -> ProviderResult<()> {
            Ok(())
        }

        async fn hide_http_service(&self, _id: &str, _name: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn pause(&self, _id: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn resume(&self, _id: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn stop(&self, _id: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn set_wake_on(&self, _id: &str, _connection: bool, _ssh: bool) -> ProviderResult<()> {
            Ok(())
        }

        async fn snapshot(&self, _id: &str) -> ProviderResult<SnapshotResult> {
            Ok(SnapshotResult {
                snapshot_id: "snap_new".to_string(),
                template_vmid: Some(201),
            })
        }

        async fn delete_template(&self, vmid: i64) -> ProviderResult<()> {
            self.deleted.lock().unwrap().push(vmid);
            Ok(())
        }
    }

    async fn test_store() -> MetadataStore {
        MetadataStore::connect("sqlite::memory:").await.unwrap()
    }

    async fn test_vault() -> SecretVault {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        SecretVault::new(pool, "test-master-secret").await.unwrap()
    }

    fn test_config() -> OrchestratorConfig {
        use secrecy::Secret;
        OrchestratorConfig {
            provider_override: Some(SandboxProvider::PveLxc),
            morph: None,
            pve_lxc: Some(cmux_config::schema::PveLxcCredentials {
                endpoint: "https://pve.local".into(),
                token: Secret::new("t".into()),
            }),
            code_host: None,
            vault_secret: None,
            task_run_jwt_secret: None,
            database_url: "sqlite://test.db".into(),
            bind_addr: "0.0.0.0:0".into(),
            log_format: cmux_config::schema::LogFormat::Pretty,
            protected_template_vmids: vec![],
        }
    }

    #[tokio::test]
    async fn create_environment_rejects_provider_mismatch() {
        let store = test_store().await;
        let vault = test_vault().await;
        let sandbox = FakeSandbox::new(SandboxProvider::Morph);
        let mut config = test_config();
        config.provider_override = Some(SandboxProvider::PveLxc);
        store.add_team_member("team1", "user1").await.unwrap();

        let result = create_environment(
            &store,
            &vault,
            &sandbox,
            &config,
            "team1",
            "user1",
            CreateEnvironmentRequest {
                name: "dev".into(),
                instance_id: "morphvm_abc".into(),
                env_vars_content: "KEY=1".into(),
                selected_repos: vec![],
                maintenance_script: None,
                dev_script: None,
                exposed_ports: vec![],
                created_by_user_id: "user1".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(OrchestratorError::Forbidden)));
    }

    #[tokio::test]
    async fn create_environment_succeeds_and_persists_vault_key() {
        let store = test_store().await;
        let vault = test_vault().await;
        let sandbox = FakeSandbox::new(SandboxProvider::PveLxc);
        let config = test_config();
        store.add_team_member("team1", "user1").await.unwrap();

        let env = create_environment(
            &store,
            &vault,
            &sandbox,
            &config,
            "team1",
            "user1",
            CreateEnvironmentRequest {
                name: "dev".into(),
                instance_id: "pvelxc-abc".into(),
                env_vars_content: "KEY=1".into(),
                selected_repos: vec!["acme/widget".into()],
                maintenance_script: None,
                dev_script: None,
                exposed_ports: vec![9000, 8080],
                created_by_user_id: "user1".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(env.exposed_ports, vec![8080, 9000]);
        let vault_key = env.data_vault_key.unwrap();
        assert_eq!(vault.get_value("env-blobs", &vault_key).await.unwrap().as_deref(), Some("KEY=1"));
    }

    #[tokio::test]
    async fn delete_environment_skips_reserved_and_protected_vmids() {
        let store = test_store().await;
        let sandbox = FakeSandbox::new(SandboxProvider::PveLxc);
        let mut config = test_config();
        config.protected_template_vmids = vec![500];

        let env = store
            .create_environment(NewEnvironment {
                team_id: "team1".into(),
                name: "dev".into(),
                snapshot_id: "s".into(),
                snapshot_provider: "pve-lxc".into(),
                template_vmid: Some(150),
                data_vault_key: None,
                selected_repos: vec![],
                maintenance_script: None,
                dev_script: None,
                exposed_ports: vec![],
            })
            .await
            .unwrap();
        store
            .create_snapshot_version(NewSnapshotVersion {
                environment_id: env.id.clone(),
                snapshot_id: "s2".into(),
                snapshot_provider: "pve-lxc".into(),
                template_vmid: Some(500),
                created_by_user_id: "user1".into(),
                label: None,
                activate: false,
                maintenance_script: None,
                dev_script: None,
            })
            .await
            .unwrap();
        store
            .create_snapshot_version(NewSnapshotVersion {
                environment_id: env.id.clone(),
                snapshot_id: "s3".into(),
                snapshot_provider: "pve-lxc".into(),
                template_vmid: Some(250),
                created_by_user_id: "user1".into(),
                label: None,
                activate: false,
                maintenance_script: None,
                dev_script: None,
            })
            .await
            .unwrap();

        delete_environment(&store, &sandbox, &config, "team1", &env.id).await.unwrap();

        let deleted = sandbox.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![250]);
        assert!(store.get_environment(&env.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_environment_rejects_cross_tenant() {
        let store = test_store().await;
        let sandbox = FakeSandbox::new(SandboxProvider::PveLxc);
        let config = test_config();

        let env = store
            .create_environment(NewEnvironment {
                team_id: "team2".into(),
                name: "dev".into(),
                snapshot_id: "s".into(),
                snapshot_provider: "pve-lxc".into(),
                template_vmid: None,
                data_vault_key: None,
                selected_repos: vec![],
                maintenance_script: None,
                dev_script: None,
                exposed_ports: vec![],
            })
            .await
            .unwrap();

        let result = delete_environment(&store, &sandbox, &config, "team1", &env.id).await;
        assert!(matches!(result, Err(OrchestratorError::Forbidden)));
    }
}
