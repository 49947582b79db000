//! `environments.{create,get,list,update,remove,updateExposedPorts}`.

use uuid::Uuid;

use crate::{
    MetadataStore,
    error::{Error, Result},
    models::{Environment, EnvironmentUpdate},
};

#[derive(sqlx::FromRow)]
struct EnvironmentRow {
    id: String,
    team_id: String,
    name: String,
    snapshot_id: String,
    snapshot_provider: String,
    template_vmid: Option<i64>,
    data_vault_key: Option<String>,
    selected_repos: String,
    maintenance_script: Option<String>,
    dev_script: Option<String>,
    exposed_ports: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EnvironmentRow> for Environment {
    type Error = Error;

    fn try_from(r: EnvironmentRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            team_id: r.team_id,
            name: r.name,
            snapshot_id: r.snapshot_id,
            snapshot_provider: r.snapshot_provider,
            template_vmid: r.template_vmid,
            data_vault_key: r.data_vault_key,
            selected_repos: serde_json::from_str(&r.selected_repos)
                .map_err(|e| Error::message(format!("corrupt selected_repos: {e}")))?,
            maintenance_script: r.maintenance_script,
            dev_script: r.dev_script,
            exposed_ports: serde_json::from_str(&r.exposed_ports)
                .map_err(|e| Error::message(format!("corrupt exposed_ports: {e}")))?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Fields needed to create an environment.
pub struct NewEnvironment {
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
}

impl MetadataStore {
    pub async fn create_environment(&self, input: NewEnvironment) -> Result<Environment> {
        let id = format!("env_{}", Uuid::new_v4().simple());
        let selected_repos = serde_json::to_string(&input.selected_repos)
            .map_err(|e| Error::message(e.to_string()))?;
        let exposed_ports = serde_json::to_string(&input.exposed_ports)
            .map_err(|e| Error::message(e.to_string()))?;

        sqlx::query(
            "INSERT INTO environments
               (id, team_id, name, snapshot_id, snapshot_provider, template_vmid,
                data_vault_key, selected_repos, maintenance_script, dev_script, exposed_ports)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.team_id)
        .bind(&input.name)
        .bind(&input.snapshot_id)
        .bind(&input.snapshot_provider)
        .bind(input.template_vmid)
        .bind(&input.data_vault_key)
        .bind(&selected_repos)
        .bind(&input.maintenance_script)
        .bind(&input.dev_script)
        .bind(&exposed_ports)
        .execute(&self.pool)
        .await?;

        self.get_environment(&id).await?.ok_or(Error::NotFound)
    }

    pub async fn get_environment(&self, id: &str) -> Result<Option<Environment>> {
        let row: Option<EnvironmentRow> = sqlx::query_as(
            "SELECT id, team_id, name, snapshot_id, snapshot_provider, template_vmid,
                    data_vault_key, selected_repos, maintenance_script, dev_script,
                    exposed_ports, created_at, updated_at
             FROM environments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_environments(&self, team_id: &str) -> Result<Vec<Environment>> {
        let rows: Vec<EnvironmentRow> = sqlx::query_as(
            "SELECT id, team_id, name, snapshot_id, snapshot_provider, template_vmid,
                    data_vault_key, selected_repos, maintenance_script, dev_script,
                    exposed_ports, created_at, updated_at
             FROM environments WHERE team_id = ? ORDER BY created_at",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update_environment(&self, id: &str, update: EnvironmentUpdate) -> Result<Environment> {
        let current = self.get_environment(id).await?.ok_or(Error::NotFound)?;

        let name = update.name.unwrap_or(current.name);
        let selected_repos = update.selected_repos.unwrap_or(current.selected_repos);
        let maintenance_script = update.maintenance_script.or(current.maintenance_script);
        let dev_script = update.dev_script.or(current.dev_script);
        let selected_repos_json =
            serde_json::to_string(&selected_repos).map_err(|e| Error::message(e.to_string()))?;

        sqlx::query(
            "UPDATE environments SET
               name = ?, selected_repos = ?, maintenance_script = ?, dev_script = ?,
               updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&selected_repos_json)
        .bind(&maintenance_script)
        .bind(&dev_script)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_environment(id).await?.ok_or(Error::NotFound)
    }

    /// `environments.updateExposedPorts` — the canonicalized set persisted by
    /// the Port Publisher (G) after reconciliation.
    pub async fn update_exposed_ports(&self, id: &str, ports: &[i64]) -> Result<()> {
        let ports_json = serde_json::to_string(ports).map_err(|e| Error::message(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE environments SET exposed_ports = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(&ports_json)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Remove an environment record. Provider-side template cleanup
    /// is the caller's responsibility —
    /// this only deletes the durable row once that cleanup has succeeded.
    pub async fn remove_environment(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM environments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}
