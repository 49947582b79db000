//! Activity Recorder (component J): records create/resume events so an
//! external GC can retire idle sandboxes. Writes are
//! best-effort — failures are logged, never surfaced to the caller.

use cmux_config::SandboxProvider;
use cmux_store::{activity::NewActivity, MetadataStore};
use tracing::warn;

pub struct ActivityRecorder<'a> {
    store: &'a MetadataStore,
}

impl<'a> ActivityRecorder<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    pub async fn record_create(
        &self,
        instance_id: &str,
        provider: SandboxProvider,
        template_vmid: Option<i64>,
        snapshot_id: Option<String>,
        snapshot_provider: Option<SandboxProvider>,
        team_id: &str,
    ) {
        let input = NewActivity {
            instance_id: instance_id.to_string(),
            provider: provider.to_string(),
            template_vmid,
            snapshot_id,
            snapshot_provider: snapshot_provider.map(|p| p.to_string()),
            team_id: team_id.to_string(),
        };
        if let Err(err) = self.store.record_create(input).await {
            warn!(instance_id, %err, "failed to record sandbox create activity");
        }
    }

    pub async fn record_resume(
        &self,
        instance_id: &str,
        provider: SandboxProvider,
        template_vmid: Option<i64>,
        snapshot_id: Option<String>,
        snapshot_provider: Option<SandboxProvider>,
        team_id: &str,
    ) {
        let input = NewActivity {
            instance_id: instance_id.to_string(),
            provider: provider.to_string(),
            template_vmid,
            snapshot_id,
            snapshot_provider: snapshot_provider.map(|p| p.to_string()),
            team_id: team_id.to_string(),
        };
        if let Err(err) = self.store.record_resume(input).await {
            warn!(instance_id, %err, "failed to record sandbox resume activity");
        }
    }
}
