//! `environmentSnapshots.{list,create,activate,findBySnapshotId}`.
//!
//! Activation is always a single transactional mutation: clear every
//! sibling's `is_active` flag and set the target's, inside one transaction,
//! so callers never observe a transient "two active" state.

use uuid::Uuid;

use crate::{
    MetadataStore,
    error::{Error, Result},
    models::SnapshotVersion,
};

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    environment_id: String,
    version: i64,
    snapshot_id: String,
    snapshot_provider: String,
    template_vmid: Option<i64>,
    created_by_user_id: String,
    created_at: String,
    label: Option<String>,
    is_active: i64,
    maintenance_script: Option<String>,
    dev_script: Option<String>,
}

impl From<SnapshotRow> for SnapshotVersion {
    fn from(r: SnapshotRow) -> Self {
        Self {
            id: r.id,
            environment_id: r.environment_id,
            version: r.version,
            snapshot_id: r.snapshot_id,
            snapshot_provider: r.snapshot_provider,
            template_vmid: r.template_vmid,
            created_by_user_id: r.created_by_user_id,
            created_at: r.created_at,
            label: r.label,
            is_active: r.is_active != 0,
            maintenance_script: r.maintenance_script,
            dev_script: r.dev_script,
        }
    }
}

pub struct NewSnapshotVersion {
    pub environment_id: String,
    pub snapshot_id: String,
    pub snapshot_provider: String,
    pub template_vmid: Option<i64>,
    pub created_by_user_id: String,
    pub label: Option<String>,
    pub activate: bool,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
}

const SNAPSHOT_COLUMNS: &str = "id, environment_id, version, snapshot_id, snapshot_provider, \
     template_vmid, created_by_user_id, created_at, label, is_active, maintenance_script, dev_script";

impl MetadataStore {
    pub async fn list_snapshot_versions(&self, environment_id: &str) -> Result<Vec<SnapshotVersion>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM environment_snapshots \
             WHERE environment_id = ? ORDER BY version"
        ))
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Append a new version with `version = max(existing)+1`. If
    /// `input.activate` is true, atomically clears the active flag on
    /// previously-active versions in the same transaction.
    pub async fn create_snapshot_version(&self, input: NewSnapshotVersion) -> Result<SnapshotVersion> {
        let mut tx = self.pool.begin().await?;

        let current_max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM environment_snapshots WHERE environment_id = ?",
        )
        .bind(&input.environment_id)
        .fetch_one(&mut *tx)
        .await?;
        let next_version = current_max.unwrap_or(0) + 1;

        if input.activate {
            sqlx::query("UPDATE environment_snapshots SET is_active = 0 WHERE environment_id = ?")
                .bind(&input.environment_id)
                .execute(&mut *tx)
                .await?;
        }

        let id = format!("snap_{}", Uuid::new_v4().simple());
        sqlx::query(
            "INSERT INTO environment_snapshots
               (id, environment_id, version, snapshot_id, snapshot_provider, template_vmid,
                created_by_user_id, label, is_active, maintenance_script, dev_script)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.environment_id)
        .bind(next_version)
        .bind(&input.snapshot_id)
        .bind(&input.snapshot_provider)
        .bind(input.template_vmid)
        .bind(&input.created_by_user_id)
        .bind(&input.label)
        .bind(input.activate)
        .bind(&input.maintenance_script)
        .bind(&input.dev_script)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_snapshot_version(&id).await?.ok_or(Error::NotFound)
    }

    pub async fn get_snapshot_version(&self, id: &str) -> Result<Option<SnapshotVersion>> {
        let row: Option<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM environment_snapshots WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Set `isActive=true` on the target and clear on siblings, in one
    /// transactional mutation.
    pub async fn activate_snapshot_version(&self, id: &str) -> Result<SnapshotVersion> {
        let mut tx = self.pool.begin().await?;

        let environment_id: Option<String> =
            sqlx::query_scalar("SELECT environment_id FROM environment_snapshots WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let environment_id = environment_id.ok_or(Error::NotFound)?;

        sqlx::query("UPDATE environment_snapshots SET is_active = 0 WHERE environment_id = ?")
            .bind(&environment_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE environment_snapshots SET is_active = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_snapshot_version(id).await?.ok_or(Error::NotFound)
    }

    /// `environmentSnapshots.findBySnapshotId` — used by the Snapshot
    /// Resolver (C) to locate which tenant a raw `snapshotId` belongs to.
    pub async fn find_snapshot_version_by_snapshot_id(
        &self,
        snapshot_id: &str,
        provider: Option<&str>,
    ) -> Result<Option<SnapshotVersion>> {
        let row: Option<SnapshotRow> = match provider {
            Some(provider) => {
                sqlx::query_as(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM environment_snapshots \
                     WHERE snapshot_id = ? AND snapshot_provider = ? LIMIT 1"
                ))
                .bind(snapshot_id)
                .bind(provider)
                .fetch_optional(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM environment_snapshots \
                     WHERE snapshot_id = ? LIMIT 1"
                ))
                .bind(snapshot_id)
                .fetch_optional(&self.pool)
                .await?
            },
        };

        Ok(row.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetadataStore, environments::NewEnvironment};

    /// A file-backed store in a scratch directory, matching the on-disk
    /// SQLite path the orchestrator runs against in production. The
    /// `TempDir` must outlive the store — dropping it deletes the file out
    /// from under the pool.
    async fn test_store() -> (MetadataStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let store = MetadataStore::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        (store, dir)
    }

    async fn test_environment(store: &MetadataStore) -> String {
        store
            .create_environment(NewEnvironment {
                team_id: "team1".into(),
                name: "dev".into(),
                snapshot_id: "snapshot_base_v1".into(),
                snapshot_provider: "morph".into(),
                template_vmid: None,
                data_vault_key: None,
                selected_repos: vec![],
                maintenance_script: None,
                dev_script: None,
                exposed_ports: vec![],
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn versions_are_monotonic() {
        let (store, _dir) = test_store().await;
        let env_id = test_environment(&store).await;

        for label in ["v1", "v2", "v3"] {
            let v = store
                .create_snapshot_version(NewSnapshotVersion {
                    environment_id: env_id.clone(),
                    snapshot_id: format!("snap_{label}"),
                    snapshot_provider: "morph".into(),
                    template_vmid: None,
                    created_by_user_id: "user1".into(),
                    label: Some(label.into()),
                    activate: false,
                    maintenance_script: None,
                    dev_script: None,
                })
                .await
                .unwrap();
            assert_eq!(v.label.as_deref(), Some(label));
        }

        let versions = store.list_snapshot_versions(&env_id).await.unwrap();
        let numbers: Vec<i64> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn exactly_one_active_after_create_with_activate() {
        let (store, _dir) = test_store().await;
        let env_id = test_environment(&store).await;

        for activate in [true, true] {
            store
                .create_snapshot_version(NewSnapshotVersion {
                    environment_id: env_id.clone(),
                    snapshot_id: "s".into(),
                    snapshot_provider: "morph".into(),
                    template_vmid: None,
                    created_by_user_id: "user1".into(),
                    label: None,
                    activate,
                    maintenance_script: None,
                    dev_script: None,
                })
                .await
                .unwrap();
        }

        let versions = store.list_snapshot_versions(&env_id).await.unwrap();
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        assert!(versions.last().unwrap().is_active);
    }

    #[tokio::test]
    async fn activate_clears_siblings() {
        let (store, _dir) = test_store().await;
        let env_id = test_environment(&store).await;

        let v1 = store
            .create_snapshot_version(NewSnapshotVersion {
                environment_id: env_id.clone(),
                snapshot_id: "s1".into(),
                snapshot_provider: "morph".into(),
                template_vmid: None,
                created_by_user_id: "user1".into(),
                label: None,
                activate: true,
                maintenance_script: None,
                dev_script: None,
            })
            .await
            .unwrap();
        let v2 = store
            .create_snapshot_version(NewSnapshotVersion {
                environment_id: env_id.clone(),
                snapshot_id: "s2".into(),
                snapshot_provider: "morph".into(),
                template_vmid: None,
                created_by_user_id: "user1".into(),
                label: None,
                activate: false,
                maintenance_script: None,
                dev_script: None,
            })
            .await
            .unwrap();

        let activated = store.activate_snapshot_version(&v2.id).await.unwrap();
        assert!(activated.is_active);

        let reloaded_v1 = store.get_snapshot_version(&v1.id).await.unwrap().unwrap();
        assert!(!reloaded_v1.is_active);
    }

    #[tokio::test]
    async fn find_by_snapshot_id() {
        let (store, _dir) = test_store().await;
        let env_id = test_environment(&store).await;
        store
            .create_snapshot_version(NewSnapshotVersion {
                environment_id: env_id,
                snapshot_id: "snapshot_private_x".into(),
                snapshot_provider: "morph".into(),
                template_vmid: None,
                created_by_user_id: "user1".into(),
                label: None,
                activate: false,
                maintenance_script: None,
                dev_script: None,
            })
            .await
            .unwrap();

        let found = store
            .find_snapshot_version_by_snapshot_id("snapshot_private_x", None)
            .await
            .unwrap();
        assert!(found.is_some());

        let not_found = store
            .find_snapshot_version_by_snapshot_id("snapshot_does_not_exist", None)
            .await
            .unwrap();
        assert!(not_found.is_none());
    }
}
