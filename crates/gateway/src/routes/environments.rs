//! `/environments/*` handlers: environment CRUD and snapshot versioning.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use cmux_orchestrator::{
    OrchestratorError,
    environment_registry::{
        CreateEnvironmentRequest, CreateSnapshotVersionRequest, activate_version, create_environment,
        create_snapshot_version, delete_environment,
    },
};
use cmux_store::models::EnvironmentUpdate;
use serde::{Deserialize, Serialize};

use crate::{auth::Caller, error::ApiError, state::AppState};

// ---- POST /environments -------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironmentBody {
    pub tenant: String,
    pub name: String,
    pub instance_id: String,
    pub env_vars_content: String,
    #[serde(default)]
    pub selected_repos: Vec<String>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<CreateEnvironmentBody>,
) -> Result<Json<cmux_store::models::Environment>, ApiError> {
    let sandbox = state
        .registry
        .client_for_instance(&body.instance_id)
        .map_err(OrchestratorError::from)?
        .clone();

    let environment = create_environment(
        &state.store,
        &state.vault,
        sandbox.as_ref(),
        &state.config,
        &body.tenant,
        caller.user_id.as_ref(),
        CreateEnvironmentRequest {
            name: body.name,
            instance_id: body.instance_id,
            env_vars_content: body.env_vars_content,
            selected_repos: body.selected_repos,
            maintenance_script: body.maintenance_script,
            dev_script: body.dev_script,
            exposed_ports: body.exposed_ports,
            created_by_user_id: caller.user_id.as_ref().to_string(),
        },
    )
    .await?;

    Ok(Json(environment))
}

// ---- GET /environments[?tenant=] ---------------------------------------

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Vec<cmux_store::models::Environment>>, ApiError> {
    let tenant = query.tenant.ok_or_else(|| OrchestratorError::BadRequest("tenant is required".to_string()))?;
    let environments = state.store.list_environments(&tenant).await.map_err(OrchestratorError::from)?;
    Ok(Json(environments))
}

// ---- GET /environments/{id} --------------------------------------------

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<cmux_store::models::Environment>, ApiError> {
    let environment = state
        .store
        .get_environment(&id)
        .await
        .map_err(OrchestratorError::from)?
        .ok_or(OrchestratorError::NotFound)?;
    Ok(Json(environment))
}

// ---- GET /environments/{id}/vars ---------------------------------------

#[derive(Debug, Serialize)]
pub struct VarsResponse {
    pub env_vars_content: String,
}

pub async fn get_vars(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VarsResponse>, ApiError> {
    let environment = state
        .store
        .get_environment(&id)
        .await
        .map_err(OrchestratorError::from)?
        .ok_or(OrchestratorError::NotFound)?;
    let Some(vault_key) = environment.data_vault_key else {
        return Ok(Json(VarsResponse {
            env_vars_content: String::new(),
        }));
    };
    let content = state
        .vault
        .get_value("env-blobs", &vault_key)
        .await
        .map_err(OrchestratorError::from)?
        .unwrap_or_default();
    Ok(Json(VarsResponse { env_vars_content: content }))
}

// ---- PATCH /environments/{id}/vars -------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchVarsBody {
    pub env_vars_content: String,
}

pub async fn patch_vars(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchVarsBody>,
) -> Result<Json<VarsResponse>, ApiError> {
    let environment = state
        .store
        .get_environment(&id)
        .await
        .map_err(OrchestratorError::from)?
        .ok_or(OrchestratorError::NotFound)?;
    let vault_key = environment
        .data_vault_key
        .ok_or_else(|| OrchestratorError::Conflict("environment has no env-var slot to update".to_string()))?;
    state
        .vault
        .set_value("env-blobs", &vault_key, &body.env_vars_content)
        .await
        .map_err(OrchestratorError::from)?;
    Ok(Json(VarsResponse {
        env_vars_content: body.env_vars_content,
    }))
}

// ---- PATCH /environments/{id} -------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatchEnvironmentBody {
    pub name: Option<String>,
    pub selected_repos: Option<Vec<String>>,
    pub maintenance_script: Option<String>,
    pub dev_script: Option<String>,
}

pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchEnvironmentBody>,
) -> Result<Json<cmux_store::models::Environment>, ApiError> {
    let environment = state
        .store
        .update_environment(
            &id,
            EnvironmentUpdate {
                name: body.name,
                selected_repos: body.selected_repos,
                maintenance_script: body.maintenance_script,
                dev_script: body.dev_script,
            },
        )
        .await
        .map_err(OrchestratorError::from)?;
    Ok(Json(environment))
}

// ---- PATCH /environments/{id}/ports ------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPortsBody {
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
}

pub async fn patch_ports(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchPortsBody>,
) -> Result<StatusCode, ApiError> {
    let ports: Vec<i64> = cmux_orchestrator::canonicalize_desired_ports(body.exposed_ports)
        .into_iter()
        .map(i64::from)
        .collect();
    state.store.update_exposed_ports(&id, &ports).await.map_err(OrchestratorError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- GET /environments/{id}/snapshots -----------------------------------

pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<cmux_store::models::SnapshotVersion>>, ApiError> {
    let versions = state.store.list_snapshot_versions(&id).await.map_err(OrchestratorError::from)?;
    Ok(Json(versions))
}

// ---- POST /environments/{id}/snapshots ----------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotBody {
    pub tenant: String,
    pub instance_id: String,
    pub label: Option<String>,
    #[serde(default)]
    pub activate: bool,
}

pub async fn create_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    caller: Caller,
    Json(body): Json<CreateSnapshotBody>,
) -> Result<Json<cmux_store::models::SnapshotVersion>, ApiError> {
    let sandbox = state
        .registry
        .client_for_instance(&body.instance_id)
        .map_err(OrchestratorError::from)?
        .clone();

    let version = create_snapshot_version(
        &state.store,
        sandbox.as_ref(),
        &body.tenant,
        caller.user_id.as_ref(),
        &id,
        CreateSnapshotVersionRequest {
            instance_id: body.instance_id,
            label: body.label,
            activate: body.activate,
        },
    )
    .await?;

    Ok(Json(version))
}

// ---- POST /environments/{id}/snapshots/{versionId}/activate ------------

pub async fn activate_snapshot(
    State(state): State<AppState>,
    Path((id, version_id)): Path<(String, String)>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<cmux_store::models::SnapshotVersion>, ApiError> {
    let tenant = query.tenant.ok_or_else(|| OrchestratorError::BadRequest("tenant is required".to_string()))?;
    let version = activate_version(&state.store, &tenant, &id, &version_id).await?;
    Ok(Json(version))
}

// ---- DELETE /environments/{id} ------------------------------------------

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<StatusCode, ApiError> {
    let tenant = query.tenant.ok_or_else(|| OrchestratorError::BadRequest("tenant is required".to_string()))?;
    let env = state
        .store
        .get_environment(&id)
        .await
        .map_err(OrchestratorError::from)?
        .ok_or(OrchestratorError::NotFound)?;
    let provider = cmux_config::SandboxProvider::parse(&env.snapshot_provider).ok_or_else(|| {
        OrchestratorError::Internal(format!("environment has unrecognized snapshot provider '{}'", env.snapshot_provider))
    })?;
    let sandbox = state.registry.client_for(provider).map_err(OrchestratorError::from)?.clone();

    delete_environment(&state.store, sandbox.as_ref(), &state.config, &tenant, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_environment_body_defaults_to_all_none() {
        let body = PatchEnvironmentBody::default();
        assert!(body.name.is_none());
        assert!(body.selected_repos.is_none());
    }
}
