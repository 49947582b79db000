//! `apiKeys.{getAll,getAllForAgents}`.

use crate::{MetadataStore, error::Result, models::ApiKey};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    team_id: String,
    provider: String,
    key_value: String,
    for_agents: i64,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(r: ApiKeyRow) -> Self {
        Self {
            id: r.id,
            team_id: r.team_id,
            provider: r.provider,
            key_value: r.key_value,
            for_agents: r.for_agents != 0,
        }
    }
}

impl MetadataStore {
    pub async fn get_all_api_keys(&self, team_id: &str) -> Result<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            "SELECT id, team_id, provider, key_value, for_agents FROM api_keys WHERE team_id = ?",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_all_api_keys_for_agents(&self, team_id: &str) -> Result<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            "SELECT id, team_id, provider, key_value, for_agents FROM api_keys \
             WHERE team_id = ? AND for_agents = 1",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
