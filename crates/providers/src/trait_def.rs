//! The uniform `SandboxInstance` interface over both back-ends, grounded on the
//! `Sandbox` trait abstraction over interchangeable container backends.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use cmux_config::SandboxProvider;

use crate::{error::Result, instance::Instance};

/// Inputs to `start`.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub snapshot_id: String,
    pub template_vmid: Option<i64>,
    pub ttl_seconds: Option<u64>,
    pub metadata: HashMap<String, String>,
}

/// Options controlling `exec`, mirroring `cmux-tools`'s `ExecOpts` shape.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Option<Duration>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self { timeout: None }
    }
}

/// `{stdout, stderr, exitCode}`.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// `(snapshotId, templateId?)` produced by `snapshot()` /
/// `createTemplateFromContainer()`.
#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub snapshot_id: String,
    pub template_vmid: Option<i64>,
}

/// Uniform capability set over the microVM cloud and the self-hosted LXC
/// back-end. Implementations differ in pause semantics, whether `start`
/// returns live networking immediately, and whether `exposeHttpService`
/// writes through to the provider.
#[async_trait]
pub trait SandboxInstance: Send + Sync {
    fn provider(&self) -> SandboxProvider;

    /// Returns the current `Instance`, including `httpServices`. Fails with
    /// [`crate::error::Error::NotFound`] if the provider reports a 404-ish
    /// error.
    async fn get(&self, id: &str) -> Result<Instance>;

    /// Provisions a new instance. For providers whose `start` may return an
    /// empty `httpServices` set, callers must re-fetch via [`Self::get`].
    async fn start(&self, request: StartRequest) -> Result<Instance>;

    /// Runs a shell command inside the container, bounded by
    /// `opts.timeout` when present.
    async fn exec(&self, id: &str, command: &str, opts: &ExecOpts) -> Result<ExecOutcome>;

    /// Idempotent: exposing an already-exposed service succeeds silently.
    async fn expose_http_service(&self, id: &str, name: &str, port: u16) -> Result<()>;

    /// Idempotent: hiding an already-hidden service succeeds silently.
    async fn hide_http_service(&self, id: &str, name: &str) -> Result<()>;

    /// Pause semantics are provider-dependent: the microVM cloud preserves
    /// RAM state; the self-hosted back-end has no hibernate and stops the
    /// container outright.
    async fn pause(&self, id: &str) -> Result<()>;

    /// Resuming an already-running instance must succeed idempotently.
    async fn resume(&self, id: &str) -> Result<()>;

    /// Stopping an already-stopped instance must succeed idempotently.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Best-effort hint that inbound traffic on `connection`/`ssh` should
    /// wake a paused instance. A no-op for providers with no such concept.
    async fn set_wake_on(&self, id: &str, connection: bool, ssh: bool) -> Result<()>;

    /// Produces a new `(snapshotId, templateId?)` pair from the instance's
    /// current filesystem (and, for the microVM cloud, RAM) state.
    async fn snapshot(&self, id: &str) -> Result<SnapshotResult>;

    /// Tears down a provider-side template/preset by vmid, used by the
    /// environment registry's delete-environment cleanup on the self-hosted
    /// back-end. Providers with no
    /// template concept no-op.
    async fn delete_template(&self, _vmid: i64) -> Result<()> {
        Ok(())
    }
}
