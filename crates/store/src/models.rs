//! Durable record shapes held in the metadata store.

use serde::{Deserialize, Serialize};

/// A user-named, reusable `(snapshot, env-vars, scripts, ports, repos)` bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub snapshot_id: String,
    pub snapshot_provider: String,
    pub template_vmid: Option<i64>,
    pub data_vault_key: Option<String>,
    pub selected_repos: Vec<String>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
    pub exposed_ports: Vec<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted by an environment update. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct EnvironmentUpdate {
    pub name: Option<String>,
    pub selected_repos: Option<Vec<String>>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
}

/// An append-only history element of an environment's snapshot, with
/// at-most-one active per environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub id: String,
    pub environment_id: String,
    pub version: i64,
    pub snapshot_id: String,
    pub snapshot_provider: String,
    pub template_vmid: Option<i64>,
    pub created_by_user_id: String,
    pub created_at: String,
    pub label: Option<String>,
    pub is_active: bool,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
}

/// `{instanceId, provider, templateVmid?, snapshotId, snapshotProvider,
/// teamId, kind: create|resume, at: now}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Create,
    Resume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxActivity {
    pub instance_id: String,
    pub provider: String,
    pub template_vmid: Option<i64>,
    pub snapshot_id: Option<String>,
    pub snapshot_provider: Option<String>,
    pub team_id: String,
    pub kind: ActivityKind,
    pub at: String,
}

/// One exposed user-owned HTTP service, as persisted on a task run's
/// `networking` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkingEntry {
    pub status: String,
    pub port: i64,
    pub url: String,
}

/// `vscode` sub-record of a task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsCodeInstance {
    pub provider: String,
    pub container_name: String,
    pub status: String,
    pub url: String,
    pub workspace_url: String,
    pub worker_url: Option<String>,
    pub vnc_url: Option<String>,
    pub xterm_url: Option<String>,
    pub started_at: String,
}

/// The subset of a `TaskRun` this system reads and writes. The record is
/// owned by a higher layer; we only touch these named fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub vscode: Option<VsCodeInstance>,
    pub starting_commit_sha: Option<String>,
    pub networking: Vec<NetworkingEntry>,
    pub discovered_repos: Vec<String>,
    pub environment_error: Option<String>,
}

/// A provider API key, scoped to a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub team_id: String,
    pub provider: String,
    pub key_value: String,
    pub for_agents: bool,
}

/// A linked code-host app installation for a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub id: String,
    pub team_id: String,
    pub account_login: String,
    pub installation_id: String,
}
