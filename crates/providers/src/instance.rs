//! Instance data model and the provider-detection rule.

use std::collections::HashMap;

use cmux_config::SandboxProvider;
use serde::{Deserialize, Serialize};

/// One entry of `instance.networking.httpServices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpService {
    pub name: String,
    pub port: u16,
    pub url: String,
}

/// `status` as seen by callers. Pause semantics differ per provider — see
/// [`crate::SandboxInstance::pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Ready,
    Paused,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub status: InstanceStatus,
    pub metadata: HashMap<String, String>,
    pub http_services: Vec<HttpService>,
}

impl Instance {
    pub fn http_service(&self, name: &str) -> Option<&HttpService> {
        self.http_services.iter().find(|s| s.name == name)
    }
}

/// Reserved service names baked into the container image. Users may not
/// expose ports under these names or numbers.
pub const CODE_EDITOR_SERVICE: &str = "code-editor";
pub const WORKER_SERVICE: &str = "worker";
pub const VNC_SERVICE: &str = "vnc";
pub const XTERM_SERVICE: &str = "xterm";

pub const CODE_EDITOR_PORT: u16 = 39378;
pub const WORKER_PORT: u16 = 39377;
pub const VNC_PORT: u16 = 39380;
pub const XTERM_PORT: u16 = 39383;

/// Every port number baked into the container image, including the
/// browser-automation variants. Users may never expose these as `port-<N>`
/// services.
pub const RESERVED_PORTS: &[u16] = &[
    CODE_EDITOR_PORT,
    WORKER_PORT,
    VNC_PORT,
    XTERM_PORT,
    // Browser-automation variants share the reserved range immediately
    // above xterm.
    39381, 39382,
];

pub fn is_reserved_port(port: u16) -> bool {
    RESERVED_PORTS.contains(&port)
}

/// User-exposed port service name: `port-<N>`.
pub fn user_port_service_name(port: u16) -> String {
    format!("port-{port}")
}

/// Parse a `port-<N>` service name back to its port number.
pub fn parse_user_port_service_name(name: &str) -> Option<u16> {
    name.strip_prefix("port-")?.parse().ok()
}

/// Detect the provider that owns an instance from its id prefix
///: `morphvm_` → microVM cloud; `pvelxc-`, `cmux-` → the
/// self-hosted LXC back-end.
pub fn provider_from_instance_id(id: &str) -> Option<SandboxProvider> {
    if id.starts_with("morphvm_") {
        Some(SandboxProvider::Morph)
    } else if id.starts_with("pvelxc-") || id.starts_with("cmux-") {
        Some(SandboxProvider::PveLxc)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("morphvm_abc123", Some(SandboxProvider::Morph))]
    #[case("pvelxc-abc123", Some(SandboxProvider::PveLxc))]
    #[case("cmux-abc123", Some(SandboxProvider::PveLxc))]
    #[case("docker-abc", None)]
    #[case("", None)]
    fn detects_provider_from_instance_id_prefix(
        #[case] id: &str,
        #[case] expected: Option<SandboxProvider>,
    ) {
        assert_eq!(provider_from_instance_id(id), expected);
    }

    #[rstest]
    #[case(CODE_EDITOR_PORT, true)]
    #[case(WORKER_PORT, true)]
    #[case(VNC_PORT, true)]
    #[case(XTERM_PORT, true)]
    #[case(39381, true)]
    #[case(39382, true)]
    #[case(8080, false)]
    #[case(3000, false)]
    fn reserved_ports_cannot_be_user_exposed(#[case] port: u16, #[case] reserved: bool) {
        assert_eq!(is_reserved_port(port), reserved);
    }

    #[test]
    fn user_port_service_name_roundtrips() {
        assert_eq!(user_port_service_name(8080), "port-8080");
        assert_eq!(parse_user_port_service_name("port-8080"), Some(8080));
        assert_eq!(parse_user_port_service_name("vnc"), None);
    }
}
