//! Client for the self-hosted Proxmox/LXC back-end. Shares the
//! `MorphVmProvider` request/response conventions (bearer auth,
//! `error_for_status` before parsing) but has no hibernate concept: `pause`
//! stops the container outright.

use async_trait::async_trait;
use cmux_config::SandboxProvider;
use secrecy::SecretString;

use crate::{
    error::Result,
    instance::Instance,
    morph::MorphVmProvider,
    trait_def::{ExecOpts, ExecOutcome, SandboxInstance, SnapshotResult, StartRequest},
};

/// Talks to the self-hosted node's control API. The wire protocol is the
/// same shape as the microVM cloud's, so request building and error
/// classification are delegated to an inner [`MorphVmProvider`] pointed at a
/// different base URL; only `provider()` and pause semantics differ.
pub struct PveLxcProvider {
    inner: MorphVmProvider,
}

impl PveLxcProvider {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            inner: MorphVmProvider::new(base_url, api_key),
        }
    }
}

#[async_trait]
impl SandboxInstance for PveLxcProvider {
    fn provider(&self) -> SandboxProvider {
        SandboxProvider::PveLxc
    }

    async fn get(&self, id: &str) -> Result<Instance> {
        self.inner.get(id).await
    }

    async fn start(&self, request: StartRequest) -> Result<Instance> {
        self.inner.start(request).await
    }

    async fn exec(&self, id: &str, command: &str, opts: &ExecOpts) -> Result<ExecOutcome> {
        self.inner.exec(id, command, opts).await
    }

    async fn expose_http_service(&self, id: &str, name: &str, port: u16) -> Result<()> {
        self.inner.expose_http_service(id, name, port).await
    }

    async fn hide_http_service(&self, id: &str, name: &str) -> Result<()> {
        self.inner.hide_http_service(id, name).await
    }

    /// No hibernate support: stops the container. Callers relying on
    /// RAM-state preservation across pause/resume must not assume it here.
    async fn pause(&self, id: &str) -> Result<()> {
        self.inner.stop(id).await
    }

    async fn resume(&self, id: &str) -> Result<()> {
        self.inner.resume(id).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.inner.stop(id).await
    }

    /// The self-hosted back-end has no wake-on-LAN-style concept; this is a
    /// no-op that always succeeds.
    async fn set_wake_on(&self, _id: &str, _connection: bool, _ssh: bool) -> Result<()> {
        Ok(())
    }

    async fn snapshot(&self, id: &str) -> Result<SnapshotResult> {
        self.inner.snapshot(id).await
    }

    /// 404s are treated as already-deleted, not an error.
    async fn delete_template(&self, vmid: i64) -> Result<()> {
        self.inner.delete_template_impl(vmid).await
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::instance::InstanceStatus;

    fn provider(base_url: &str) -> PveLxcProvider {
        PveLxcProvider::new(base_url, SecretString::from("test-key".to_string()))
    }

    #[tokio::test]
    async fn pause_issues_a_stop_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/instances/pvelxc-abc/stop")
            .with_status(200)
            .create_async()
            .await;

        provider(&server.url()).pause("pvelxc-abc").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn set_wake_on_is_a_no_op() {
        let server = mockito::Server::new_async().await;
        provider(&server.url())
            .set_wake_on("pvelxc-abc", true, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_template_treats_404_as_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/templates/201")
            .with_status(404)
            .create_async()
            .await;

        provider(&server.url()).delete_template(201).await.unwrap();
    }

    #[tokio::test]
    async fn get_delegates_to_inner_client() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instances/pvelxc-abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"pvelxc-abc","status":"paused","metadata":{},"http_services":[]}"#)
            .create_async()
            .await;

        let instance = provider(&server.url()).get("pvelxc-abc").await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Paused);
    }
}
