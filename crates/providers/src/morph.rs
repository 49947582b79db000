//! Client for the microVM cloud provider, reached over its HTTP API.
//! Request/response shaping follows the provider-client pattern used for
//! other HTTP-backed adapters in this workspace: a `reqwest::Client` plus
//! a bearer key, `error_for_status` checked before body parsing.

use async_trait::async_trait;
use cmux_config::SandboxProvider;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    instance::{HttpService, Instance, InstanceStatus},
    trait_def::{ExecOpts, ExecOutcome, SandboxInstance, SnapshotResult, StartRequest},
};

pub struct MorphVmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl MorphVmProvider {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Shared with [`crate::pve_lxc::PveLxcProvider`], whose template
    /// deletion reuses this same request plumbing against a different base
    /// URL.
    pub(crate) async fn delete_template_impl(&self, vmid: i64) -> Result<()> {
        match self
            .send(self.client.delete(self.url(&format!("/templates/{vmid}"))))
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = builder
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(classify_transport_error)?;
        match resp.error_for_status_ref() {
            Ok(_) => Ok(resp),
            Err(e) => {
                let status = e.status();
                tracing::warn!(?status, url = %e.url().map(ToString::to_string).unwrap_or_default(), "provider request failed");
                Err(classify_status_error(status))
            }
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_connect() {
        Error::ConnectionRefused
    } else {
        Error::Http(err)
    }
}

fn classify_status_error(status: Option<StatusCode>) -> Error {
    match status {
        Some(StatusCode::NOT_FOUND) => Error::NotFound,
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => Error::AuthFailure,
        Some(StatusCode::TOO_MANY_REQUESTS) => Error::RateLimited,
        Some(StatusCode::INSUFFICIENT_STORAGE) | Some(StatusCode::SERVICE_UNAVAILABLE) => {
            Error::QuotaExceeded
        }
        _ => Error::StartFailed,
    }
}

#[derive(Debug, Deserialize)]
struct RawHttpService {
    name: String,
    port: u16,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    id: String,
    status: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
    #[serde(default)]
    http_services: Vec<RawHttpService>,
}

impl From<RawInstance> for Instance {
    fn from(raw: RawInstance) -> Self {
        let status = match raw.status.as_str() {
            "ready" | "running" => InstanceStatus::Ready,
            "paused" => InstanceStatus::Paused,
            "starting" | "pending" => InstanceStatus::Starting,
            _ => InstanceStatus::Unknown,
        };
        Instance {
            id: raw.id,
            status,
            metadata: raw.metadata,
            http_services: raw
                .http_services
                .into_iter()
                .map(|s| HttpService {
                    name: s.name,
                    port: s.port,
                    url: s.url,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawExecResult {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    snapshot_id: String,
    #[serde(default)]
    template_vmid: Option<i64>,
}

#[async_trait]
impl SandboxInstance for MorphVmProvider {
    fn provider(&self) -> SandboxProvider {
        SandboxProvider::Morph
    }

    async fn get(&self, id: &str) -> Result<Instance> {
        let resp = self
            .send(self.client.get(self.url(&format!("/instances/{id}"))))
            .await?;
        Ok(resp.json::<RawInstance>().await?.into())
    }

    async fn start(&self, request: StartRequest) -> Result<Instance> {
        let body = serde_json::json!({
            "snapshotId": request.snapshot_id,
            "templateVmid": request.template_vmid,
            "ttlSeconds": request.ttl_seconds,
            "metadata": request.metadata,
        });
        let resp = self
            .send(self.client.post(self.url("/instances")).json(&body))
            .await?;
        Ok(resp.json::<RawInstance>().await?.into())
    }

    async fn exec(&self, id: &str, command: &str, opts: &ExecOpts) -> Result<ExecOutcome> {
        let body = serde_json::json!({
            "command": command,
            "timeoutSeconds": opts.timeout.map(|d| d.as_secs()),
        });
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/instances/{id}/exec")))
                    .json(&body),
            )
            .await?;
        let raw: RawExecResult = resp.json().await?;
        Ok(ExecOutcome {
            stdout: raw.stdout,
            stderr: raw.stderr,
            exit_code: raw.exit_code,
        })
    }

    async fn expose_http_service(&self, id: &str, name: &str, port: u16) -> Result<()> {
        let body = serde_json::json!({ "name": name, "port": port });
        self.send(
            self.client
                .post(self.url(&format!("/instances/{id}/http-services")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn hide_http_service(&self, id: &str, name: &str) -> Result<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/instances/{id}/http-services/{name}"))),
        )
        .await?;
        Ok(())
    }

    async fn pause(&self, id: &str) -> Result<()> {
        self.send(self.client.post(self.url(&format!("/instances/{id}/pause"))))
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<()> {
        self.send(self.client.post(self.url(&format!("/instances/{id}/resume"))))
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.send(self.client.post(self.url(&format!("/instances/{id}/stop"))))
            .await?;
        Ok(())
    }

    async fn set_wake_on(&self, id: &str, connection: bool, ssh: bool) -> Result<()> {
        let body = serde_json::json!({ "connection": connection, "ssh": ssh });
        self.send(
            self.client
                .post(self.url(&format!("/instances/{id}/wake-on")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn snapshot(&self, id: &str) -> Result<SnapshotResult> {
        let resp = self
            .send(self.client.post(self.url(&format!("/instances/{id}/snapshot"))))
            .await?;
        let raw: RawSnapshot = resp.json().await?;
        Ok(SnapshotResult {
            snapshot_id: raw.snapshot_id,
            template_vmid: raw.template_vmid,
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn provider(base_url: &str) -> MorphVmProvider {
        MorphVmProvider::new(base_url, SecretString::from("test-key".to_string()))
    }

    #[tokio::test]
    async fn get_maps_running_status_to_ready() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/instances/morphvm_abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"morphvm_abc","status":"running","metadata":{},"http_services":[]}"#)
            .create_async()
            .await;

        let instance = provider(&server.url()).get("morphvm_abc").await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Ready);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_maps_to_not_found_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instances/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = provider(&server.url()).get("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn rate_limited_status_maps_to_rate_limited_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/instances")
            .with_status(429)
            .create_async()
            .await;

        let err = provider(&server.url())
            .start(StartRequest {
                snapshot_id: "snap_1".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited));
    }

    #[tokio::test]
    async fn exec_returns_exit_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/instances/morphvm_abc/exec")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"stdout":"hi","stderr":"","exit_code":0}"#)
            .create_async()
            .await;

        let outcome = provider(&server.url())
            .exec("morphvm_abc", "echo hi", &ExecOpts::default())
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "hi");
    }
}
