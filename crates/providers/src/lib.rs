//! Provider adapter: a uniform [`SandboxInstance`] interface over the
//! microVM cloud and the self-hosted Proxmox/LXC back-end, plus the
//! [`ProviderRegistry`] that resolves configuration and instance ids to a
//! concrete client.

pub mod error;
pub mod instance;
pub mod morph;
pub mod pve_lxc;
pub mod registry;
pub mod trait_def;

pub use {
    error::{Error, Result},
    instance::{
        is_reserved_port, parse_user_port_service_name, provider_from_instance_id,
        user_port_service_name, HttpService, Instance, InstanceStatus, CODE_EDITOR_PORT,
        CODE_EDITOR_SERVICE, RESERVED_PORTS, VNC_PORT, VNC_SERVICE, WORKER_PORT, WORKER_SERVICE,
        XTERM_PORT, XTERM_SERVICE,
    },
    morph::MorphVmProvider,
    pve_lxc::PveLxcProvider,
    registry::{ProviderRegistry, MORPH_API_BASE_URL},
    trait_def::{ExecOpts, ExecOutcome, SandboxInstance, SnapshotResult, StartRequest},
};
