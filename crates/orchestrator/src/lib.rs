//! Control-plane logic sitting between the HTTP surface and the provider
//! adapters: snapshot resolution, authorization, activity recording, port
//! reconciliation, script orchestration, hydration, environment registry,
//! and the lifecycle controller that composes all of the above into the
//! start/pause/resume/stop/status/force-wake operations.

pub mod activity_recorder;
pub mod authz;
pub mod environment_registry;
pub mod error;
pub mod hydration;
pub mod lifecycle_controller;
pub mod port_publisher;
pub mod script_orchestrator;
pub mod snapshot_resolver;

pub use {
    activity_recorder::ActivityRecorder,
    authz::Authorizer,
    error::{OrchestratorError, Result, UpstreamErrorKind},
    hydration::{hydrate, HydrationRequest, RepoCheckout},
    lifecycle_controller::{
        LifecycleController, StartOutcome, StartRequest, StatusOutcome, WORKER_READINESS_PATH,
    },
    port_publisher::{canonicalize_desired_ports, desired_ports, reconcile, PublishedPort},
    script_orchestrator::{launch_dev, launch_maintenance, poll_maintenance, RunPaths, ScriptOutcome},
    snapshot_resolver::{KnownDefaultSnapshot, ResolvedSnapshot, SnapshotResolver},
};
