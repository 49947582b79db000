//! `taskRuns.{get,updateVSCodeInstance,updateVSCodeStatus,updateDiscoveredRepos,
//! updateStartingCommitSha,updateNetworking,updateEnvironmentError}`.
//!
//! The task run record itself is owned by a higher layer; this store only
//! reads and writes the named fields used by the provisioning pipeline.

use crate::{
    MetadataStore,
    error::{Error, Result},
    models::{NetworkingEntry, TaskRun, VsCodeInstance},
};

#[derive(sqlx::FromRow)]
struct TaskRunRow {
    id: String,
    team_id: String,
    user_id: String,
    vscode: Option<String>,
    starting_commit_sha: Option<String>,
    networking: String,
    discovered_repos: String,
    environment_error: Option<String>,
}

impl TryFrom<TaskRunRow> for TaskRun {
    type Error = Error;

    fn try_from(r: TaskRunRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            team_id: r.team_id,
            user_id: r.user_id,
            vscode: r
                .vscode
                .map(|v| serde_json::from_str(&v))
                .transpose()
                .map_err(|e| Error::message(format!("corrupt vscode field: {e}")))?,
            starting_commit_sha: r.starting_commit_sha,
            networking: serde_json::from_str(&r.networking)
                .map_err(|e| Error::message(format!("corrupt networking field: {e}")))?,
            discovered_repos: serde_json::from_str(&r.discovered_repos)
                .map_err(|e| Error::message(format!("corrupt discovered_repos field: {e}")))?,
            environment_error: r.environment_error,
        })
    }
}

const TASK_RUN_COLUMNS: &str =
    "id, team_id, user_id, vscode, starting_commit_sha, networking, discovered_repos, environment_error";

impl MetadataStore {
    pub async fn get_task_run(&self, id: &str) -> Result<Option<TaskRun>> {
        let row: Option<TaskRunRow> =
            sqlx::query_as(&format!("SELECT {TASK_RUN_COLUMNS} FROM task_runs WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Inserts the row if it does not exist yet, otherwise creates a fresh
    /// one carrying only `id`/`team_id`/`user_id` — callers ensure the task
    /// run exists upstream; this crate's contract is limited to the fields
    /// the orchestrator actually touches.
    pub async fn ensure_task_run(&self, id: &str, team_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_runs (id, team_id, user_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(team_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `taskRuns.updateVSCodeInstance` — persists pending VSCode info
    /// or promotes it after hydration (step 16).
    pub async fn update_vscode_instance(&self, id: &str, vscode: &VsCodeInstance) -> Result<()> {
        let json = serde_json::to_string(vscode).map_err(|e| Error::message(e.to_string()))?;
        let result = sqlx::query("UPDATE task_runs SET vscode = ? WHERE id = ?")
            .bind(&json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// `taskRuns.updateVSCodeStatus` — promotes `starting` → `running` etc.
    /// without touching the rest of the `vscode` sub-record.
    pub async fn update_vscode_status(&self, id: &str, status: &str) -> Result<()> {
        let run = self.get_task_run(id).await?.ok_or(Error::NotFound)?;
        let Some(mut vscode) = run.vscode else {
            return Err(Error::message("task run has no vscode instance to update"));
        };
        vscode.status = status.to_string();
        self.update_vscode_instance(id, &vscode).await
    }

    pub async fn update_discovered_repos(&self, id: &str, repos: &[String]) -> Result<()> {
        let json = serde_json::to_string(repos).map_err(|e| Error::message(e.to_string()))?;
        let result = sqlx::query("UPDATE task_runs SET discovered_repos = ? WHERE id = ?")
            .bind(&json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// `taskRuns.updateStartingCommitSha` — recorded once per run,
    /// immediately after hydration.
    pub async fn update_starting_commit_sha(&self, id: &str, sha: &str) -> Result<()> {
        let result = sqlx::query("UPDATE task_runs SET starting_commit_sha = ? WHERE id = ?")
            .bind(sha)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    pub async fn update_networking(&self, id: &str, entries: &[NetworkingEntry]) -> Result<()> {
        let json = serde_json::to_string(entries).map_err(|e| Error::message(e.to_string()))?;
        let result = sqlx::query("UPDATE task_runs SET networking = ? WHERE id = ?")
            .bind(&json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// `taskRuns.updateEnvironmentError` — the channel background stages use
    /// to surface maintenance/dev script failures to the UI.
    pub async fn update_environment_error(&self, id: &str, error: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE task_runs SET environment_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}
