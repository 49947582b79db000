//! Team membership, backing Authorization & Tenancy (I) check 1
//!: "Caller membership in the target tenant".

use crate::{MetadataStore, error::Result};

impl MetadataStore {
    pub async fn is_team_member(&self, team_id: &str, user_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM team_members WHERE team_id = ? AND user_id = ? LIMIT 1",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO team_members (team_id, user_id) VALUES (?, ?) \
             ON CONFLICT(team_id, user_id) DO NOTHING",
        )
        .bind(team_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataStore;

    #[tokio::test]
    async fn membership_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let store = MetadataStore::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        assert!(!store.is_team_member("team1", "user1").await.unwrap());

        store.add_team_member("team1", "user1").await.unwrap();
        assert!(store.is_team_member("team1", "user1").await.unwrap());
        assert!(!store.is_team_member("team1", "user2").await.unwrap());
    }
}
