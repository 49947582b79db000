//! `sandboxInstances.{recordCreate, recordResume, getActivity}`.
//!
//! Writes here are always best-effort from the caller's point of view: the
//! Lifecycle Controller treats failures as non-fatal and only logs them.

use uuid::Uuid;

use crate::{
    MetadataStore,
    error::Result,
    models::{ActivityKind, SandboxActivity},
};

pub struct NewActivity {
    pub instance_id: String,
    pub provider: String,
    pub template_vmid: Option<i64>,
    pub snapshot_id: Option<String>,
    pub snapshot_provider: Option<String>,
    pub team_id: String,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    instance_id: String,
    provider: String,
    template_vmid: Option<i64>,
    snapshot_id: Option<String>,
    snapshot_provider: Option<String>,
    team_id: String,
    kind: String,
    at: String,
}

impl TryFrom<ActivityRow> for SandboxActivity {
    type Error = crate::error::Error;

    fn try_from(r: ActivityRow) -> Result<Self> {
        let kind = match r.kind.as_str() {
            "create" => ActivityKind::Create,
            "resume" => ActivityKind::Resume,
            other => return Err(crate::error::Error::message(format!("unknown activity kind: {other}"))),
        };
        Ok(Self {
            instance_id: r.instance_id,
            provider: r.provider,
            template_vmid: r.template_vmid,
            snapshot_id: r.snapshot_id,
            snapshot_provider: r.snapshot_provider,
            team_id: r.team_id,
            kind,
            at: r.at,
        })
    }
}

impl MetadataStore {
    async fn record(&self, input: NewActivity, kind: ActivityKind) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let kind_str = match kind {
            ActivityKind::Create => "create",
            ActivityKind::Resume => "resume",
        };
        sqlx::query(
            "INSERT INTO sandbox_activity
               (id, instance_id, provider, template_vmid, snapshot_id, snapshot_provider, team_id, kind)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.instance_id)
        .bind(&input.provider)
        .bind(input.template_vmid)
        .bind(&input.snapshot_id)
        .bind(&input.snapshot_provider)
        .bind(&input.team_id)
        .bind(kind_str)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_create(&self, input: NewActivity) -> Result<()> {
        self.record(input, ActivityKind::Create).await
    }

    pub async fn record_resume(&self, input: NewActivity) -> Result<()> {
        self.record(input, ActivityKind::Resume).await
    }

    pub async fn get_activity(&self, instance_id: &str) -> Result<Vec<SandboxActivity>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            "SELECT instance_id, provider, template_vmid, snapshot_id, snapshot_provider, team_id, kind, at
             FROM sandbox_activity WHERE instance_id = ? ORDER BY at",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataStore;

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

    fn activity() -> NewActivity {
        NewActivity {
            instance_id: "morphvm_abc".into(),
            provider: "morph".into(),
            template_vmid: None,
            snapshot_id: Some("snapshot_base_v1".into()),
            snapshot_provider: Some("morph".into()),
            team_id: "team1".into(),
        }
    }

    #[tokio::test]
    async fn records_create_and_resume() {
        let (store, _dir) = test_store().await;
        store.record_create(activity()).await.unwrap();
        store.record_resume(activity()).await.unwrap();

        let records = store.get_activity("morphvm_abc").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ActivityKind::Create);
        assert_eq!(records[1].kind, ActivityKind::Resume);
    }

    #[tokio::test]
    async fn activity_scoped_by_instance() {
        let (store, _dir) = test_store().await;
        store.record_create(activity()).await.unwrap();

        let mut other = activity();
        other.instance_id = "morphvm_other".into();
        store.record_create(other).await.unwrap();

        assert_eq!(store.get_activity("morphvm_abc").await.unwrap().len(), 1);
    }
}
