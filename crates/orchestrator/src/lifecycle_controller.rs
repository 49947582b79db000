//! Lifecycle Controller (component H): composes every other component into
//! the start pipeline plus pause/resume/stop/status/force-wake operations.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use cmux_config::{OrchestratorConfig, SandboxProvider};
use cmux_credentials::{hydration_permissions, CredentialBroker, ResolvedAuth};
use cmux_providers::{
    ExecOpts, Instance, ProviderRegistry, SandboxInstance, StartRequest as ProviderStartRequest,
    CODE_EDITOR_SERVICE, WORKER_SERVICE,
};
use cmux_store::{models::VsCodeInstance, MetadataStore};
use cmux_vault::SecretVault;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, warn};

use crate::{
    activity_recorder::ActivityRecorder,
    error::{OrchestratorError, Result},
    hydration::{self, HydrationRequest, RepoCheckout},
    script_orchestrator::{self, RunPaths, ScriptOutcome},
    snapshot_resolver::{KnownDefaultSnapshot, SnapshotResolver},
};

/// The in-container long-poll path the worker service must answer 2xx on
/// before a start is considered ready. Pinned as a constant (rather than
/// inlined at the one call site) so a future worker image swap is a
/// one-line change with a compile error at every reference if removed.
pub const WORKER_READINESS_PATH: &str = "/socket.io/?EIO=4&transport=polling";

const READINESS_TOTAL_BUDGET: Duration = Duration::from_secs(15);
const READINESS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

const FORCE_WAKE_TOTAL_BUDGET: Duration = Duration::from_secs(90);
const FORCE_WAKE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A start request, carrying everything the start pipeline needs up front.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub team_id: String,
    pub caller_user_id: String,
    pub environment_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub task_run_id: Option<String>,
    pub task_run_jwt: Option<String>,
    pub cloud_workspace: bool,
    pub repo_url: Option<String>,
    pub base_branch: Option<String>,
    pub new_branch: Option<String>,
    pub clone_depth: Option<u32>,
    pub metadata: HashMap<String, String>,
    /// The caller's own GitHub OAuth token, used as the fallback auth
    /// source when no installation token covers `repo_owner`.
    pub oauth_token: Option<SecretString>,
}

/// `(instanceId, vscodeUrl, workerUrl, vncUrl?, xtermUrl?, provider,
/// vscodePersisted)`.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub instance_id: String,
    pub vscode_url: String,
    pub worker_url: Option<String>,
    pub vnc_url: Option<String>,
    pub xterm_url: Option<String>,
    pub provider: SandboxProvider,
    pub vscode_persisted: bool,
}

/// `{running, vscodeUrl?, workerUrl?, provider}`.
#[derive(Debug, Clone)]
pub struct StatusOutcome {
    pub running: bool,
    pub vscode_url: Option<String>,
    pub worker_url: Option<String>,
    pub provider: SandboxProvider,
}

pub struct LifecycleController<'a> {
    store: &'a MetadataStore,
    vault: &'a SecretVault,
    config: &'a OrchestratorConfig,
    registry: &'a ProviderRegistry,
    credential_broker: &'a CredentialBroker,
    known_defaults: &'a [KnownDefaultSnapshot],
}

impl<'a> LifecycleController<'a> {
    pub fn new(
        store: &'a MetadataStore,
        vault: &'a SecretVault,
        config: &'a OrchestratorConfig,
        registry: &'a ProviderRegistry,
        credential_broker: &'a CredentialBroker,
        known_defaults: &'a [KnownDefaultSnapshot],
    ) -> Self {
        Self {
            store,
            vault,
            config,
            registry,
            credential_broker,
            known_defaults,
        }
    }

    /// The full start pipeline.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        // Step 1: Resolve. Fatal on failure.
        let resolver = SnapshotResolver::new(self.store, self.config, self.known_defaults);
        let resolved = resolver
            .resolve(
                &request.caller_user_id,
                &request.team_id,
                request.environment_id.as_deref(),
                request.snapshot_id.as_deref(),
            )
            .await?;

        let sandbox: Arc<dyn SandboxInstance> = self.registry.default_client().map_err(OrchestratorError::from)?.clone();

        // Step 2: determine source repo. Body override wins, else the
        // environment's first selected repo. No repo means hydration is a
        // no-op later.
        let repo_url = request.repo_url.clone().or_else(|| resolved.selected_repos.first().cloned());

        // Step 3: load workspace config (cloud-workspace case only).
        // Non-fatal; absent config is simply skipped — this service owns no
        // per-repo workspace-config table of its own, so there is nothing
        // further to fetch here beyond what step 2 already resolved.
        if request.cloud_workspace && repo_url.is_none() {
            warn!("cloud workspace start requested with no resolvable source repo");
        }

        // Step 4: start instance. Fatal.
        let mut metadata = request.metadata.clone();
        metadata.insert(crate::authz::METADATA_APP.to_string(), "cmux-sandbox".to_string());
        metadata.insert(crate::authz::METADATA_USER_ID.to_string(), request.caller_user_id.clone());
        metadata.insert(crate::authz::METADATA_TEAM_ID.to_string(), request.team_id.clone());
        if let Some(environment_id) = &request.environment_id {
            metadata.insert(crate::authz::METADATA_ENVIRONMENT_ID.to_string(), environment_id.clone());
        }
        if let Some(task_run_id) = &request.task_run_id {
            metadata.insert(crate::authz::METADATA_TASK_RUN_ID.to_string(), task_run_id.clone());
        }

        let mut instance = match sandbox
            .start(ProviderStartRequest {
                snapshot_id: resolved.snapshot_id.clone(),
                template_vmid: resolved.template_vmid,
                ttl_seconds: request.ttl_seconds,
                metadata,
            })
            .await
        {
            Ok(instance) => instance,
            Err(err) => return Err(OrchestratorError::from(err)),
        };

        // Step 5: record creation. Non-fatal.
        ActivityRecorder::new(self.store)
            .record_create(
                &instance.id,
                resolved.provider,
                resolved.template_vmid,
                Some(resolved.snapshot_id.clone()),
                Some(resolved.provider),
                &request.team_id,
            )
            .await;

        // Step 6: re-fetch if httpServices empty.
        if instance.http_services.is_empty() {
            match sandbox.get(&instance.id).await {
                Ok(refreshed) => instance = refreshed,
                Err(err) => {
                    self.compensate_stop(sandbox.as_ref(), &instance.id).await;
                    return Err(OrchestratorError::from(err));
                }
            }
        }

        // Step 7: assert essentials.
        let code_editor = instance.http_service(CODE_EDITOR_SERVICE).cloned();
        let worker = instance.http_service(WORKER_SERVICE).cloned();
        let (Some(code_editor), Some(worker)) = (code_editor, worker) else {
            self.compensate_stop(sandbox.as_ref(), &instance.id).await;
            return Err(OrchestratorError::Internal(
                "instance started without code-editor or worker services".to_string(),
            ));
        };

        // Step 8: readiness probe. Best-effort.
        self.probe_readiness(&code_editor.url, &worker.url).await;

        // Step 9: persist pending VSCode info. Non-fatal.
        let mut vscode_persisted = false;
        if let Some(task_run_id) = &request.task_run_id {
            let vscode = VsCodeInstance {
                provider: resolved.provider.to_string(),
                container_name: instance.id.clone(),
                status: "starting".to_string(),
                url: code_editor.url.clone(),
                workspace_url: code_editor.url.clone(),
                worker_url: Some(worker.url.clone()),
                vnc_url: None,
                xterm_url: None,
                started_at: Utc::now().to_rfc3339(),
            };
            match self.store.update_vscode_instance(task_run_id, &vscode).await {
                Ok(()) => vscode_persisted = true,
                Err(err) => warn!(task_run_id, %err, "failed to persist pending vscode info"),
            }
            if let Err(err) = self
                .store
                .update_discovered_repos(task_run_id, &resolved.selected_repos)
                .await
            {
                warn!(task_run_id, %err, "failed to persist discovered repos");
            }
        }

        // Step 10: compose env vars, invoke `envctl load`. Non-fatal.
        self.load_env_vars(sandbox.as_ref(), &instance.id, resolved.data_vault_key.as_deref(), &request)
            .await;

        // Step 11: configure git identity. Best-effort.
        self.configure_git_identity(sandbox.as_ref(), &instance.id).await;

        // Step 12/13: resolve git auth token, install code-host CLI auth.
        let mut auth_token: Option<SecretString> = None;
        if let Some(repo_url) = &repo_url {
            if let Some(owner) = repo_owner(repo_url) {
                match self
                    .resolve_and_install_auth(
                        sandbox.as_ref(),
                        &instance.id,
                        &request.team_id,
                        &owner,
                        request.oauth_token.as_ref(),
                    )
                    .await
                {
                    Ok(token) => auth_token = token,
                    Err(err) => warn!(instance_id = %instance.id, %err, "git auth install failed"),
                }
            }
        }

        // Step 14: hydration, fatal on failure.
        if let Some(repo_url) = &repo_url {
            let hydration_request = build_hydration_request(repo_url, &request, auth_token.clone());
            if let Err(err) = hydration::hydrate(sandbox.as_ref(), &instance.id, &hydration_request).await {
                self.compensate_stop(sandbox.as_ref(), &instance.id).await;
                return Err(err);
            }
        }

        // Step 15: capture starting commit.
        if let Some(task_run_id) = &request.task_run_id {
            self.capture_starting_commit(sandbox.as_ref(), &instance.id, task_run_id).await;
        }

        // Step 16: promote VSCode status to running.
        if let Some(task_run_id) = &request.task_run_id {
            if vscode_persisted {
                if let Err(err) = self.store.update_vscode_status(task_run_id, "running").await {
                    warn!(task_run_id, %err, "failed to promote vscode status to running");
                }
            }
        }

        // Step 17: launch scripts in background, fire-and-forget.
        self.launch_scripts_in_background(resolved.maintenance_script.clone(), resolved.dev_script.clone(), sandbox.clone(), instance.id.clone());

        Ok(StartOutcome {
            instance_id: instance.id,
            vscode_url: code_editor.url,
            worker_url: Some(worker.url),
            vnc_url: None,
            xterm_url: None,
            provider: resolved.provider,
            vscode_persisted,
        })
    }

    async fn compensate_stop(&self, sandbox: &dyn SandboxInstance, instance_id: &str) {
        if let Err(err) = sandbox.stop(instance_id).await {
            error!(instance_id, %err, "compensating stop after failed start also failed");
        }
    }

    async fn probe_readiness(&self, code_editor_url: &str, worker_url: &str) {
        let deadline = tokio::time::Instant::now() + READINESS_TOTAL_BUDGET;
        let client = reqwest::Client::new();
        let worker_probe_url = format!("{}{}", worker_url.trim_end_matches('/'), WORKER_READINESS_PATH);

        let mut code_editor_ready = false;
        let mut worker_ready = false;

        while tokio::time::Instant::now() < deadline && !(code_editor_ready && worker_ready) {
            if !code_editor_ready {
                code_editor_ready = probe_once(&client, code_editor_url, true).await;
            }
            if !worker_ready {
                worker_ready = probe_once(&client, &worker_probe_url, false).await;
            }
            if code_editor_ready && worker_ready {
                break;
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }

        if !(code_editor_ready && worker_ready) {
            warn!(code_editor_ready, worker_ready, "readiness probe timed out; proceeding best-effort");
        }
    }

    async fn load_env_vars(
        &self,
        sandbox: &dyn SandboxInstance,
        instance_id: &str,
        data_vault_key: Option<&str>,
        request: &StartRequest,
    ) {
        let mut composite = String::new();
        if let Some(key) = data_vault_key {
            match self.vault.get_value("env-blobs", key).await {
                Ok(Some(value)) => {
                    composite.push_str(&value);
                    composite.push('\n');
                }
                Ok(None) => {}
                Err(err) => warn!(instance_id, %err, "failed to load environment vault blob"),
            }
        }
        if let Some(task_run_id) = &request.task_run_id {
            composite.push_str(&format!("CMUX_TASK_RUN_ID={task_run_id}\n"));
        }
        if let Some(jwt) = &request.task_run_jwt {
            composite.push_str(&format!("CMUX_TASK_RUN_JWT={jwt}\n"));
        }
        if let Some(jwt_secret) = &self.config.task_run_jwt_secret {
            composite.push_str(&format!("CMUX_TASK_RUN_JWT_SECRET={}\n", jwt_secret.expose_secret()));
        }

        if composite.is_empty() {
            return;
        }

        let cmd = format!("envctl load <<'CMUX_ENV_EOF'\n{composite}CMUX_ENV_EOF\n");
        match sandbox.exec(instance_id, &cmd, &ExecOpts::default()).await {
            Ok(outcome) if outcome.exit_code == 0 => {}
            Ok(outcome) => warn!(instance_id, exit_code = outcome.exit_code, "envctl load exited non-zero"),
            Err(err) => warn!(instance_id, %err, "envctl load failed"),
        }
    }

    async fn configure_git_identity(&self, sandbox: &dyn SandboxInstance, instance_id: &str) {
        const CMD: &str = "git config --global user.name cmux \
            && git config --global user.email cmux@cmux.dev \
            && git config --global init.defaultBranch main \
            && git config --global push.autoSetupRemote true";
        if let Err(err) = sandbox.exec(instance_id, CMD, &ExecOpts::default()).await {
            warn!(instance_id, %err, "failed to configure git identity");
        }
    }

    async fn resolve_and_install_auth(
        &self,
        sandbox: &dyn SandboxInstance,
        instance_id: &str,
        team_id: &str,
        repo_owner: &str,
        user_oauth: Option<&SecretString>,
    ) -> Result<Option<SecretString>> {
        let connections = self.store.list_provider_connections(team_id).await?;
        let mut installation_tokens = Vec::new();
        for connection in &connections {
            if let Ok(token) = self
                .credential_broker
                .mint_installation_token(
                    &connection.installation_id,
                    None,
                    hydration_permissions(),
                    Some(&connection.account_login),
                )
                .await
            {
                installation_tokens.push(token);
            }
        }

        let resolved = cmux_credentials::resolve_best_token(repo_owner, &installation_tokens, user_oauth);
        let token = match resolved {
            ResolvedAuth::Installation(token) | ResolvedAuth::UserOAuth(token) => Some(token),
            ResolvedAuth::None => None,
        };

        if let Some(token) = &token {
            cmux_credentials::install_git_auth(sandbox, instance_id, token).await?;
        }
        Ok(token)
    }

    async fn capture_starting_commit(&self, sandbox: &dyn SandboxInstance, instance_id: &str, task_run_id: &str) {
        let cmd = "git -C /root/workspace rev-parse HEAD 2>/dev/null";
        match sandbox.exec(instance_id, cmd, &ExecOpts::default()).await {
            Ok(outcome) if outcome.exit_code == 0 => {
                let sha = outcome.stdout.trim();
                if is_commit_sha(sha) {
                    if let Err(err) = self.store.update_starting_commit_sha(task_run_id, sha).await {
                        warn!(task_run_id, %err, "failed to persist starting commit sha");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => warn!(task_run_id, %err, "failed to capture starting commit"),
        }
    }

    fn launch_scripts_in_background(
        &self,
        maintenance_script: Option<String>,
        dev_script: Option<String>,
        sandbox: Arc<dyn SandboxInstance>,
        instance_id: String,
    ) {
        if maintenance_script.is_none() && dev_script.is_none() {
            return;
        }
        let store = self.store.clone();
        tokio::spawn(async move {
            let paths = RunPaths::new();
            let maintenance_outcome = if let Some(script) = &maintenance_script {
                match script_orchestrator::launch_maintenance(sandbox.as_ref(), &instance_id, &paths, script).await {
                    Ok(()) => Some(script_orchestrator::poll_maintenance(sandbox.as_ref(), &instance_id, &paths).await),
                    Err(err) => Some(ScriptOutcome {
                        ran: true,
                        exit_code: None,
                        error: Some(err.to_string()),
                    }),
                }
            } else {
                None
            };

            if let Some(outcome) = &maintenance_outcome {
                if let Some(error) = &outcome.error {
                    let _ = store.update_environment_error(&instance_id, Some(error)).await;
                } else if let Some(code) = outcome.exit_code.filter(|&code| code != 0) {
                    let message = format!("maintenance script exited {code}");
                    let _ = store.update_environment_error(&instance_id, Some(&message)).await;
                }
            }

            if let Some(script) = &dev_script {
                let wait_for_maintenance = maintenance_script.is_some();
                let outcome =
                    script_orchestrator::launch_dev(sandbox.as_ref(), &instance_id, &paths, script, wait_for_maintenance)
                        .await;
                if let Some(error) = outcome.error {
                    let _ = store.update_environment_error(&instance_id, Some(&error)).await;
                }
            }
        });
    }

    /// **Pause/stop** — microVM `pause` preserves RAM state; LXC `pause`
    /// actually stops (no hibernate). Never pre-kills in-container processes
    /// for microVM pauses.
    pub async fn pause(&self, instance_id: &str) -> Result<()> {
        let sandbox = self.registry.client_for_instance(instance_id)?;
        sandbox.pause(instance_id).await.map_err(Into::into)
    }

    pub async fn stop(&self, instance_id: &str) -> Result<()> {
        let sandbox = self.registry.client_for_instance(instance_id)?;
        sandbox.stop(instance_id).await.map_err(Into::into)
    }

    /// **Resume** — idempotent if already running; else starts the instance,
    /// promotes vscode status, and records a resume activity.
    pub async fn resume(&self, instance_id: &str, task_run_id: Option<&str>, team_id: &str) -> Result<()> {
        let sandbox = self.registry.client_for_instance(instance_id)?;
        let instance = sandbox.get(instance_id).await?;
        if instance.status != cmux_providers::InstanceStatus::Ready {
            sandbox.resume(instance_id).await?;
        }

        if let Some(task_run_id) = task_run_id {
            if let Err(err) = self.store.update_vscode_status(task_run_id, "running").await {
                warn!(task_run_id, %err, "failed to promote vscode status on resume");
            }
        }

        ActivityRecorder::new(self.store)
            .record_resume(instance_id, sandbox.provider(), None, None, None, team_id)
            .await;
        Ok(())
    }

    /// **Force-wake** — authorization is the caller's responsibility
    ///; this
    /// method assumes the caller already passed [`crate::authz::Authorizer`]
    /// checks and focuses on the resume-then-poll mechanics.
    pub async fn force_wake(&self, instance_id: &str, task_run_id: Option<&str>, team_id: &str) -> Result<StatusOutcome> {
        self.resume(instance_id, task_run_id, team_id).await?;

        let sandbox = self.registry.client_for_instance(instance_id)?;
        let deadline = tokio::time::Instant::now() + FORCE_WAKE_TOTAL_BUDGET;
        loop {
            let instance = sandbox.get(instance_id).await?;
            if instance.status == cmux_providers::InstanceStatus::Ready {
                if let Some(task_run_id) = task_run_id {
                    let _ = self.store.update_vscode_status(task_run_id, "running").await;
                }
                return Ok(self.status_from_instance(&instance, sandbox.provider()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestratorError::GatewayTimeout);
            }
            tokio::time::sleep(FORCE_WAKE_POLL_INTERVAL).await;
        }
    }

    /// **Status** — `running` requires live instance state *and* a
    /// code-editor service.
    pub async fn status(&self, instance_id: &str) -> Result<StatusOutcome> {
        let sandbox = self.registry.client_for_instance(instance_id)?;
        let instance = sandbox.get(instance_id).await?;
        Ok(self.status_from_instance(&instance, sandbox.provider()))
    }

    fn status_from_instance(&self, instance: &Instance, provider: SandboxProvider) -> StatusOutcome {
        let code_editor = instance.http_service(CODE_EDITOR_SERVICE);
        let worker = instance.http_service(WORKER_SERVICE);
        let running = instance.status == cmux_providers::InstanceStatus::Ready && code_editor.is_some();
        StatusOutcome {
            running,
            vscode_url: code_editor.map(|s| s.url.clone()),
            worker_url: worker.map(|s| s.url.clone()),
            provider,
        }
    }
}

async fn probe_once(client: &reqwest::Client, url: &str, head: bool) -> bool {
    let result = if head {
        client.head(url).timeout(READINESS_PROBE_TIMEOUT).send().await
    } else {
        client.get(url).timeout(READINESS_PROBE_TIMEOUT).send().await
    };
    match result {
        Ok(resp) => {
            let status = resp.status();
            status.is_success() || status.as_u16() == 301 || status.as_u16() == 302
        }
        Err(_) => false,
    }
}

fn is_commit_sha(candidate: &str) -> bool {
    candidate.len() == 40 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

fn repo_owner(repo_url: &str) -> Option<String> {
    let trimmed = repo_url.trim_end_matches(".git").trim_end_matches('/');
    let path = trimmed.rsplit_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
    let path = path.split_once('/').map(|(_, rest)| rest).unwrap_or(path);
    path.split('/').next().map(ToOwned::to_owned).filter(|s| !s.is_empty())
}

fn build_hydration_request(repo_url: &str, request: &StartRequest, auth_token: Option<SecretString>) -> HydrationRequest {
    let (owner, repo) = split_owner_repo(repo_url).unwrap_or_default();
    HydrationRequest {
        workspace_path: "/root/workspace".to_string(),
        depth: request.clone_depth.unwrap_or(1),
        repo: Some(RepoCheckout {
            owner: owner.clone(),
            repo: repo.clone(),
            repo_full: format!("{owner}/{repo}"),
            clone_url: repo_url.to_string(),
            base_branch: request.base_branch.clone().unwrap_or_else(|| "main".to_string()),
            new_branch: request.new_branch.clone(),
            auth_token,
        }),
    }
}

fn split_owner_repo(repo_url: &str) -> Option<(String, String)> {
    let trimmed = repo_url.trim_end_matches(".git").trim_end_matches('/');
    let path = trimmed.rsplit_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
    let path = path.split_once('/').map(|(_, rest)| rest).unwrap_or(path);
    let mut parts = path.rsplitn(2, '/');
    let repo = parts.next()?.to_string();
    let owner = parts.next()?.to_string();
    Some((owner, repo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_owner_parses_https_url() {
        assert_eq!(repo_owner("https://github.com/acme-corp/widgets"), Some("acme-corp".to_string()));
    }

    #[test]
    fn repo_owner_parses_url_with_trailing_git() {
        assert_eq!(repo_owner("https://github.com/acme-corp/widgets.git"), Some("acme-corp".to_string()));
    }

    #[test]
    fn split_owner_repo_round_trips() {
        assert_eq!(
            split_owner_repo("https://github.com/acme-corp/widgets.git"),
            Some(("acme-corp".to_string(), "widgets".to_string()))
        );
    }

    #[test]
    fn commit_sha_validation_requires_forty_hex_chars() {
        assert!(is_commit_sha("abcdef0123456789abcdef0123456789abcdef01"));
        assert!(!is_commit_sha("not-a-sha"));
        assert!(!is_commit_sha(""));
    }

    #[test]
    fn build_hydration_request_defaults_base_branch_and_depth() {
        let request = StartRequest::default();
        let hydration = build_hydration_request("https://github.com/acme-corp/widgets.git", &request, None);
        assert_eq!(hydration.depth, 1);
        let repo = hydration.repo.expect("repo checkout");
        assert_eq!(repo.owner, "acme-corp");
        assert_eq!(repo.repo, "widgets");
        assert_eq!(repo.repo_full, "acme-corp/widgets");
        assert_eq!(repo.base_branch, "main");
        assert!(repo.new_branch.is_none());
        assert!(repo.auth_token.is_none());
    }

    #[test]
    fn build_hydration_request_honors_explicit_base_branch_and_new_branch() {
        let request = StartRequest {
            base_branch: Some("develop".to_string()),
            new_branch: Some("feature/x".to_string()),
            clone_depth: Some(50),
            ..StartRequest::default()
        };
        let hydration = build_hydration_request("https://github.com/acme-corp/widgets", &request, None);
        assert_eq!(hydration.depth, 50);
        let repo = hydration.repo.expect("repo checkout");
        assert_eq!(repo.base_branch, "develop");
        assert_eq!(repo.new_branch.as_deref(), Some("feature/x"));
    }
}
