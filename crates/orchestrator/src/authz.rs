//! Authorization & Tenancy (component I): the three ownership checks,
//! all failures mapping to 403 except the instance-shape ambiguity case,
//! which maps to 404 to avoid existence leaks.

use cmux_providers::Instance;
use cmux_store::MetadataStore;

use crate::error::{OrchestratorError, Result};

/// Recognized instance metadata keys.
pub const METADATA_APP: &str = "app";
pub const METADATA_USER_ID: &str = "userId";
pub const METADATA_TEAM_ID: &str = "teamId";
pub const METADATA_ENVIRONMENT_ID: &str = "environmentId";
pub const METADATA_AGENT_NAME: &str = "agentName";
pub const METADATA_TASK_RUN_ID: &str = "taskRunId";

const APP_PREFIX: &str = "cmux";

pub struct Authorizer<'a> {
    store: &'a MetadataStore,
}

impl<'a> Authorizer<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    /// Check 1: caller membership in the target tenant.
    pub async fn require_team_membership(&self, team_id: &str, caller_user_id: &str) -> Result<()> {
        if self.store.is_team_member(team_id, caller_user_id).await? {
            Ok(())
        } else {
            Err(OrchestratorError::Forbidden)
        }
    }

    /// Check 2: instance metadata `teamId == caller.teamId` (when present).
    /// An `app` key absent or not prefixed `cmux` maps to 404 instead of
    /// 403, per the "unknown-instance-shape" rule.
    pub fn require_instance_ownership(&self, instance: &Instance, caller_team_id: &str) -> Result<()> {
        match instance.metadata.get(METADATA_APP) {
            Some(app) if app.starts_with(APP_PREFIX) => {}
            _ => return Err(OrchestratorError::NotFound),
        }
        match instance.metadata.get(METADATA_TEAM_ID) {
            Some(team_id) if team_id != caller_team_id => Err(OrchestratorError::Forbidden),
            _ => Ok(()),
        }
    }

    /// Check 3: run-scoped operations (force-wake, refresh-auth, SSH)
    /// additionally require run ownership by user or by team, depending on
    /// the resource's scope.
    pub fn require_run_ownership_by_user(&self, run_user_id: &str, caller_user_id: &str) -> Result<()> {
        if run_user_id == caller_user_id {
            Ok(())
        } else {
            Err(OrchestratorError::Forbidden)
        }
    }

    pub fn require_run_ownership_by_team(&self, run_team_id: &str, caller_team_id: &str) -> Result<()> {
        if run_team_id == caller_team_id {
            Ok(())
        } else {
            Err(OrchestratorError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cmux_providers::InstanceStatus;

    use super::*;

    fn instance(metadata: HashMap<String, String>) -> Instance {
        Instance {
            id: "morphvm_abc".into(),
            status: InstanceStatus::Ready,
            metadata,
            http_services: Vec::new(),
        }
    }

    fn store_authorizer(store: &MetadataStore) -> Authorizer<'_> {
        Authorizer::new(store)
    }

    #[tokio::test]
    async fn membership_check_fails_closed() {
        let store = MetadataStore::connect("sqlite::memory:").await.unwrap();
        let authz = store_authorizer(&store);
        assert!(authz.require_team_membership("team1", "user1").await.is_err());

        store.add_team_member("team1", "user1").await.unwrap();
        assert!(authz.require_team_membership("team1", "user1").await.is_ok());
    }

    #[tokio::test]
    async fn missing_app_prefix_maps_to_not_found() {
        let store = MetadataStore::connect("sqlite::memory:").await.unwrap();
        let authz = store_authorizer(&store);
        let instance = instance(HashMap::new());
        let err = authz.require_instance_ownership(&instance, "team1").unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound));
    }

    #[tokio::test]
    async fn team_mismatch_maps_to_forbidden() {
        let store = MetadataStore::connect("sqlite::memory:").await.unwrap();
        let authz = store_authorizer(&store);
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_APP.to_string(), "cmux-sandbox".to_string());
        metadata.insert(METADATA_TEAM_ID.to_string(), "team2".to_string());
        let instance = instance(metadata);

        let err = authz.require_instance_ownership(&instance, "team1").unwrap_err();
        assert!(matches!(err, OrchestratorError::Forbidden));
    }

    #[tokio::test]
    async fn matching_team_passes() {
        let store = MetadataStore::connect("sqlite::memory:").await.unwrap();
        let authz = store_authorizer(&store);
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_APP.to_string(), "cmux-sandbox".to_string());
        metadata.insert(METADATA_TEAM_ID.to_string(), "team1".to_string());
        let instance = instance(metadata);

        assert!(authz.require_instance_ownership(&instance, "team1").is_ok());
    }
}
