//! `github.listProviderConnections`.

use crate::{MetadataStore, error::Result, models::ProviderConnection};

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    team_id: String,
    account_login: String,
    installation_id: String,
}

impl From<ConnectionRow> for ProviderConnection {
    fn from(r: ConnectionRow) -> Self {
        Self {
            id: r.id,
            team_id: r.team_id,
            account_login: r.account_login,
            installation_id: r.installation_id,
        }
    }
}

impl MetadataStore {
    /// All installations linked to `team_id`. The Credential Broker (B) uses
    /// this to resolve the best installation for a repo owner
    ///: case-insensitive match on `account_login`.
    pub async fn list_provider_connections(&self, team_id: &str) -> Result<Vec<ProviderConnection>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(
            "SELECT id, team_id, account_login, installation_id FROM github_connections WHERE team_id = ?",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
