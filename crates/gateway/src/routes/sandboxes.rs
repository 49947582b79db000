//! `/sandboxes/*` handlers: the provisioning and lifecycle surface.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use cmux_orchestrator::{
    OrchestratorError, RunPaths, StartRequest as LifecycleStartRequest, WORKER_READINESS_PATH,
    authz::{METADATA_ENVIRONMENT_ID, METADATA_TEAM_ID, METADATA_USER_ID},
    desired_ports, launch_dev, launch_maintenance, poll_maintenance, reconcile,
};
use cmux_providers::{ExecOpts, Instance};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{auth::Caller, error::ApiError, state::AppState};

/// The ssh relay host every instance is reachable through. Pinned as a
/// constant so a future relay migration is a one-line change, same
/// reasoning as [`WORKER_READINESS_PATH`].
const SSH_RELAY_HOST: &str = "ssh.cmux.dev";

fn team_id_of(instance: &Instance) -> Option<&str> {
    instance.metadata.get(METADATA_TEAM_ID).map(String::as_str)
}

async fn fetch_and_authorize(
    state: &AppState,
    instance_id: &str,
    tenant: &str,
) -> Result<(Instance, std::sync::Arc<dyn cmux_providers::SandboxInstance>), ApiError> {
    let sandbox = state
        .registry
        .client_for_instance(instance_id)
        .map_err(OrchestratorError::from)?
        .clone();
    let instance = sandbox.get(instance_id).await.map_err(OrchestratorError::from)?;
    state.authorizer().require_instance_ownership(&instance, tenant)?;
    Ok((instance, sandbox))
}

/// Check 3 for run-scoped operations (force-wake, refresh-auth, SSH): the
/// caller must be the user who started the run, or — for team-owned runs
/// with no recorded starter — a member of the owning team.
fn require_run_ownership(state: &AppState, instance: &Instance, caller_user_id: &str, tenant: &str) -> Result<(), ApiError> {
    let authz = state.authorizer();
    if let Some(run_user_id) = instance.metadata.get(METADATA_USER_ID) {
        authz.require_run_ownership_by_user(run_user_id, caller_user_id)?;
    } else if let Some(run_team_id) = instance.metadata.get(METADATA_TEAM_ID) {
        authz.require_run_ownership_by_team(run_team_id, tenant)?;
    }
    Ok(())
}

// ---- POST /sandboxes/start --------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    pub tenant: String,
    pub environment_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub task_run_id: Option<String>,
    pub task_run_jwt: Option<String>,
    #[serde(default)]
    pub is_cloud_workspace: bool,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub new_branch: Option<String>,
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub instance_id: String,
    pub vscode_url: String,
    pub worker_url: Option<String>,
    pub vnc_url: Option<String>,
    pub xterm_url: Option<String>,
    pub provider: String,
    pub vscode_persisted: bool,
}

pub async fn start(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<StartBody>,
) -> Result<Json<StartResponse>, ApiError> {
    state
        .authorizer()
        .require_team_membership(&body.tenant, caller.user_id.as_ref())
        .await?;

    let outcome = state
        .lifecycle()
        .start(LifecycleStartRequest {
            team_id: body.tenant,
            caller_user_id: caller.user_id.as_ref().to_string(),
            environment_id: body.environment_id,
            snapshot_id: body.snapshot_id,
            ttl_seconds: body.ttl_seconds,
            task_run_id: body.task_run_id,
            task_run_jwt: body.task_run_jwt,
            cloud_workspace: body.is_cloud_workspace,
            repo_url: body.repo_url,
            base_branch: body.branch,
            new_branch: body.new_branch,
            clone_depth: body.depth,
            metadata: body.metadata,
            oauth_token: Some(caller.access_token.clone()),
        })
        .await?;

    Ok(Json(StartResponse {
        instance_id: outcome.instance_id,
        vscode_url: outcome.vscode_url,
        worker_url: outcome.worker_url,
        vnc_url: outcome.vnc_url,
        xterm_url: outcome.xterm_url,
        provider: outcome.provider.to_string(),
        vscode_persisted: outcome.vscode_persisted,
    }))
}

// ---- POST /sandboxes/{id}/env ------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEnvBody {
    pub tenant: String,
    pub env_vars_content: String,
}

#[derive(Debug, Serialize)]
pub struct AppliedResponse {
    pub applied: bool,
}

pub async fn apply_env(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ApplyEnvBody>,
) -> Result<Json<AppliedResponse>, ApiError> {
    let (_instance, sandbox) = fetch_and_authorize(&state, &id, &body.tenant).await?;

    let cmd = format!("envctl load <<'CMUX_ENV_EOF'\n{}\nCMUX_ENV_EOF\n", body.env_vars_content);
    let outcome = sandbox.exec(&id, &cmd, &ExecOpts::default()).await.map_err(OrchestratorError::from)?;
    if outcome.exit_code != 0 {
        return Err(OrchestratorError::Internal("envctl load exited non-zero".to_string()).into());
    }
    Ok(Json(AppliedResponse { applied: true }))
}

// ---- POST /sandboxes/{id}/run-scripts ----------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScriptsBody {
    pub tenant: String,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub started: bool,
}

pub async fn run_scripts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RunScriptsBody>,
) -> Result<Json<StartedResponse>, ApiError> {
    let (_instance, sandbox) = fetch_and_authorize(&state, &id, &body.tenant).await?;

    if body.maintenance_script.is_none() && body.dev_script.is_none() {
        return Ok(Json(StartedResponse { started: false }));
    }

    let store = state.store.clone();
    let instance_id = id.clone();
    let maintenance_script = body.maintenance_script;
    let dev_script = body.dev_script;
    tokio::spawn(async move {
        let paths = RunPaths::new();
        let mut failure: Option<String> = None;

        if let Some(script) = &maintenance_script {
            match launch_maintenance(sandbox.as_ref(), &instance_id, &paths, script).await {
                Ok(()) => {
                    let outcome = poll_maintenance(sandbox.as_ref(), &instance_id, &paths).await;
                    if let Some(error) = outcome.error {
                        failure = Some(error);
                    } else if let Some(code) = outcome.exit_code.filter(|&c| c != 0) {
                        failure = Some(format!("maintenance script exited {code}"));
                    }
                }
                Err(err) => failure = Some(err.to_string()),
            }
        }
        if let Some(error) = &failure {
            let _ = store.update_environment_error(&instance_id, Some(error)).await;
        }

        if let Some(script) = &dev_script {
            let outcome =
                launch_dev(sandbox.as_ref(), &instance_id, &paths, script, maintenance_script.is_some()).await;
            if let Some(error) = outcome.error {
                let _ = store.update_environment_error(&instance_id, Some(&error)).await;
            }
        }
    });

    Ok(Json(StartedResponse { started: true }))
}

// ---- POST /sandboxes/{id}/stop -----------------------------------------

pub async fn stop(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.lifecycle().stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- GET /sandboxes/{id}/status ----------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    pub vscode_url: Option<String>,
    pub worker_url: Option<String>,
    pub provider: Option<String>,
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let outcome = state.lifecycle().status(&id).await?;
    Ok(Json(StatusResponse {
        running: outcome.running,
        vscode_url: outcome.vscode_url,
        worker_url: outcome.worker_url,
        provider: Some(outcome.provider.to_string()),
    }))
}

// ---- POST /sandboxes/{id}/publish-devcontainer -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDevcontainerBody {
    pub tenant: String,
    pub task_run_id: String,
}

pub async fn publish_devcontainer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PublishDevcontainerBody>,
) -> Result<Json<Vec<cmux_orchestrator::PublishedPort>>, ApiError> {
    let sandbox = state
        .registry
        .client_for_instance(&id)
        .map_err(OrchestratorError::from)?
        .clone();
    let instance = sandbox.get(&id).await.map_err(OrchestratorError::from)?;

    let exposed_ports: Vec<u16> = match instance.metadata.get(METADATA_ENVIRONMENT_ID) {
        Some(environment_id) => state
            .store
            .get_environment(environment_id)
            .await
            .map_err(OrchestratorError::from)?
            .map(|env| env.exposed_ports.into_iter().filter_map(|p| u16::try_from(p).ok()).collect())
            .unwrap_or_default(),
        None => Vec::new(),
    };
    let desired = desired_ports(sandbox.as_ref(), &id, &exposed_ports).await;
    let published = reconcile(sandbox.as_ref(), &id, &instance, &desired).await?;

    let entries: Vec<cmux_store::models::NetworkingEntry> = published
        .iter()
        .map(|p| cmux_store::models::NetworkingEntry {
            status: p.status.to_string(),
            port: i64::from(p.port),
            url: p.url.clone(),
        })
        .collect();
    if let Err(err) = state.store.update_networking(&body.task_run_id, &entries).await {
        warn!(task_run_id = %body.task_run_id, %err, "failed to persist published ports onto task run");
    }
    let _ = body.tenant;

    Ok(Json(published))
}

// ---- POST /sandboxes/{id}/resume ---------------------------------------

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

#[derive(Debug, Serialize)]
pub struct ResumedResponse {
    pub resumed: bool,
}

pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ResumedResponse>, ApiError> {
    fetch_and_authorize(&state, &id, &query.tenant).await?;
    state.lifecycle().resume(&id, None, &query.tenant).await?;
    Ok(Json(ResumedResponse { resumed: true }))
}

// ---- POST /sandboxes/{id}/force-wake -----------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceWakeBody {
    pub tenant: String,
    pub task_run_id: Option<String>,
}

pub async fn force_wake(
    State(state): State<AppState>,
    Path(id): Path<String>,
    caller: Caller,
    Json(body): Json<ForceWakeBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (instance, _sandbox) = fetch_and_authorize(&state, &id, &body.tenant).await?;
    require_run_ownership(&state, &instance, caller.user_id.as_ref(), &body.tenant)?;

    let outcome = state
        .lifecycle()
        .force_wake(&id, body.task_run_id.as_deref(), &body.tenant)
        .await?;
    Ok(Json(StatusResponse {
        running: outcome.running,
        vscode_url: outcome.vscode_url,
        worker_url: outcome.worker_url,
        provider: Some(outcome.provider.to_string()),
    }))
}

// ---- POST /sandboxes/{id}/refresh-github-auth --------------------------

#[derive(Debug, Deserialize)]
pub struct RefreshAuthBody {
    pub tenant: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshedResponse {
    pub refreshed: bool,
}

pub async fn refresh_github_auth(
    State(state): State<AppState>,
    Path(id): Path<String>,
    caller: Caller,
    Json(body): Json<RefreshAuthBody>,
) -> Result<Json<RefreshedResponse>, ApiError> {
    let (instance, sandbox) = fetch_and_authorize(&state, &id, &body.tenant).await?;
    require_run_ownership(&state, &instance, caller.user_id.as_ref(), &body.tenant)?;
    if instance.status == cmux_providers::InstanceStatus::Paused {
        return Err(OrchestratorError::Conflict("cannot refresh auth on a paused container".to_string()).into());
    }

    let connections = state
        .store
        .list_provider_connections(&body.tenant)
        .await
        .map_err(OrchestratorError::from)?;
    let mut minted = None;
    for connection in &connections {
        if let Ok(token) = state
            .credential_broker
            .mint_installation_token(
                &connection.installation_id,
                None,
                cmux_credentials::hydration_permissions(),
                Some(&connection.account_login),
            )
            .await
        {
            minted = Some(token.token);
            break;
        }
    }
    let Some(token) = minted else {
        return Err(OrchestratorError::NotConfigured.into());
    };

    cmux_credentials::refresh_git_auth(sandbox.as_ref(), &id, &token)
        .await
        .map_err(OrchestratorError::from)?;
    Ok(Json(RefreshedResponse { refreshed: true }))
}

// ---- POST /sandboxes/{id}/discover-repos -------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverReposBody {
    pub workspace_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverReposResponse {
    pub repos: Vec<String>,
    pub paths: Vec<PathEntry>,
}

#[derive(Debug, Serialize)]
pub struct PathEntry {
    pub path: String,
    pub repo: Option<String>,
}

pub async fn discover_repos(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<DiscoverReposBody>>,
) -> Result<Json<DiscoverReposResponse>, ApiError> {
    let sandbox = state
        .registry
        .client_for_instance(&id)
        .map_err(OrchestratorError::from)?
        .clone();
    let workspace_path = body
        .and_then(|Json(b)| b.workspace_path)
        .unwrap_or_else(|| "/root/workspace".to_string());

    let cmd = format!(
        "for d in $(find {workspace_path} -maxdepth 3 -name .git -type d 2>/dev/null); do \
           repo_dir=$(dirname \"$d\"); \
           remote=$(git -C \"$repo_dir\" remote get-url origin 2>/dev/null); \
           echo \"$repo_dir|$remote\"; \
         done"
    );
    let outcome = sandbox.exec(&id, &cmd, &ExecOpts::default()).await.map_err(OrchestratorError::from)?;

    let mut repos = Vec::new();
    let mut paths = Vec::new();
    for line in outcome.stdout.lines() {
        let Some((path, remote)) = line.split_once('|') else { continue };
        let repo = repo_full_name(remote);
        if let Some(repo) = &repo {
            if !repos.contains(repo) {
                repos.push(repo.clone());
            }
        }
        paths.push(PathEntry {
            path: path.to_string(),
            repo,
        });
    }

    Ok(Json(DiscoverReposResponse { repos, paths }))
}

fn repo_full_name(remote_url: &str) -> Option<String> {
    let trimmed = remote_url.trim().trim_end_matches(".git").trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let path = trimmed.rsplit_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
    let path = path.split_once(':').map(|(_, rest)| rest).unwrap_or(path);
    let path = path.split_once('/').map(|(_, rest)| rest).unwrap_or(path);
    let mut parts = path.rsplitn(2, '/');
    let repo = parts.next()?;
    let owner = parts.next()?;
    Some(format!("{owner}/{repo}"))
}

// ---- GET /sandboxes/{id}/ssh --------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshResponse {
    pub instance_id: String,
    pub ssh_command: String,
    pub access_token: String,
    pub user: String,
    pub status: String,
}

pub async fn ssh(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    caller: Caller,
) -> Result<Json<SshResponse>, ApiError> {
    let (instance, _sandbox) = fetch_and_authorize(&state, &id, &query.tenant).await?;
    require_run_ownership(&state, &instance, caller.user_id.as_ref(), &query.tenant)?;

    let status = match instance.status {
        cmux_providers::InstanceStatus::Starting => "starting",
        cmux_providers::InstanceStatus::Ready => "ready",
        cmux_providers::InstanceStatus::Paused => "paused",
        cmux_providers::InstanceStatus::Unknown => "unknown",
    };
    let _ = team_id_of(&instance);

    Ok(Json(SshResponse {
        instance_id: id.clone(),
        ssh_command: format!("ssh -o StrictHostKeyChecking=no {id}@{SSH_RELAY_HOST}"),
        access_token: caller.access_token.expose_secret().to_string(),
        user: "root".to_string(),
        status: status.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_full_name_parses_https_remote() {
        assert_eq!(
            repo_full_name("https://github.com/acme-corp/widgets.git"),
            Some("acme-corp/widgets".to_string())
        );
    }

    #[test]
    fn repo_full_name_parses_ssh_remote() {
        assert_eq!(
            repo_full_name("git@github.com:acme-corp/widgets.git"),
            Some("acme-corp/widgets".to_string())
        );
    }

    #[test]
    fn repo_full_name_rejects_empty_remote() {
        assert_eq!(repo_full_name(""), None);
    }

    #[test]
    fn worker_readiness_path_is_reexported() {
        assert_eq!(WORKER_READINESS_PATH, "/socket.io/?EIO=4&transport=polling");
    }
}
