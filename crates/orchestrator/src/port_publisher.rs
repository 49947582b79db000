//! Port Publisher (component G): reconciles the desired exposed-port set
//! against the provider's live set.

use cmux_config::SandboxProvider;
use cmux_providers::{user_port_service_name, Instance, SandboxInstance};
use tracing::error;

use crate::error::Result;

/// `{status, port, url}`, persisted onto the task-run record after
/// reconciliation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishedPort {
    pub status: &'static str,
    pub port: u16,
    pub url: String,
}

/// Sorted, deduped, reserved-port-free desired set.
pub fn canonicalize_desired_ports(ports: impl IntoIterator<Item = u16>) -> Vec<u16> {
    let mut out: Vec<u16> = ports
        .into_iter()
        .filter(|p| !cmux_providers::is_reserved_port(*p))
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

const DEVCONTAINER_PATH: &str = "/root/workspace/.devcontainer/devcontainer.json";

#[derive(serde::Deserialize)]
struct DevcontainerConfig {
    #[serde(default, rename = "forwardPorts")]
    forward_ports: Vec<u16>,
}

/// `environment.exposedPorts` if non-empty, else `.forwardPorts` read from
/// the devcontainer config in the workspace.
pub async fn desired_ports(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    exposed_ports: &[u16],
) -> Vec<u16> {
    if !exposed_ports.is_empty() {
        return canonicalize_desired_ports(exposed_ports.iter().copied());
    }

    let cmd = format!("cat {DEVCONTAINER_PATH} 2>/dev/null");
    let forward_ports = match sandbox.exec(instance_id, &cmd, &cmux_providers::ExecOpts::default()).await {
        Ok(outcome) if outcome.exit_code == 0 => {
            serde_json::from_str::<DevcontainerConfig>(&outcome.stdout)
                .map(|cfg| cfg.forward_ports)
                .unwrap_or_default()
        }
        _ => Vec::new(),
    };
    canonicalize_desired_ports(forward_ports)
}

/// Reconciles `instance`'s live `port-*` services against `desired`:
/// hides services no longer desired, exposes services newly desired.
/// Individual expose/hide failures are logged; reconciliation continues
/// with the remaining ports so state converges on a later call.
pub async fn reconcile(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    instance: &Instance,
    desired: &[u16],
) -> Result<Vec<PublishedPort>> {
    let mut had_failure = false;

    for service in &instance.http_services {
        let Some(port) = cmux_providers::parse_user_port_service_name(&service.name) else {
            continue;
        };
        if cmux_providers::is_reserved_port(port) || desired.contains(&port) {
            continue;
        }
        if let Err(err) = sandbox.hide_http_service(instance_id, &service.name).await {
            error!(instance_id, port, %err, "failed to hide port service");
            had_failure = true;
        }
    }

    let currently_exposed: Vec<u16> = instance
        .http_services
        .iter()
        .filter_map(|s| cmux_providers::parse_user_port_service_name(&s.name))
        .collect();

    for &port in desired {
        if currently_exposed.contains(&port) {
            continue;
        }
        let name = user_port_service_name(port);
        if let Err(err) = sandbox.expose_http_service(instance_id, &name, port).await {
            error!(instance_id, port, %err, "failed to expose port service");
            had_failure = true;
        }
    }

    // The microVM back-end's exposeHttpService write-through is observable
    // only after a refresh; the LXC back-end's is in-memory-only and would
    // be lost by one.
    let final_instance = if sandbox.provider() == SandboxProvider::Morph {
        sandbox.get(instance_id).await?
    } else {
        instance.clone()
    };

    if had_failure {
        tracing::warn!(instance_id, "port reconciliation completed with partial failures");
    }

    let mut published: Vec<PublishedPort> = final_instance
        .http_services
        .iter()
        .filter_map(|s| {
            cmux_providers::parse_user_port_service_name(&s.name).map(|port| PublishedPort {
                status: "running",
                port,
                url: s.url.clone(),
            })
        })
        .collect();
    published.sort_by_key(|p| p.port);
    Ok(published)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cmux_providers::{ExecOutcome, SnapshotResult, StartRequest};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(vec![9000, 8080, 8080, cmux_providers::WORKER_PORT], vec![8080, 9000])]
    #[case(vec![], vec![])]
    #[case(vec![cmux_providers::CODE_EDITOR_PORT, cmux_providers::VNC_PORT], vec![])]
    #[case(vec![3000, 2000, 1000], vec![1000, 2000, 3000])]
    fn canonicalize_drops_reserved_ports_sorts_and_dedups(
        #[case] input: Vec<u16>,
        #[case] expected: Vec<u16>,
    ) {
        assert_eq!(canonicalize_desired_ports(input), expected);
    }

    struct FakeSandbox {
        devcontainer_body: Option<String>,
    }

    #[async_trait]
    impl SandboxInstance for FakeSandbox {
        fn provider(&self) -> SandboxProvider {
            SandboxProvider::Morph
        }

        async fn get(&self, _id: &str) -> cmux_providers::Result<Instance> {
            unreachable!("not exercised by these tests")
        }

        async fn start(&self, _request: StartRequest) -> cmux_providers::Result<Instance> {
            unreachable!("not exercised by these tests")
        }

        async fn exec(
            &self,
            _id: &str,
            _command: &str,
            _opts: &cmux_providers::ExecOpts,
        ) -> cmux_providers::Result<ExecOutcome> {
            match &self.devcontainer_body {
                Some(body) => Ok(ExecOutcome {
                    stdout: body.clone(),
                    stderr: String::new(),
                    exit_code: 0,
                }),
                None => Ok(ExecOutcome {
                    stdout: String::new(),
                    stderr: "no such file".into(),
                    exit_code: 1,
                }),
            }
        }

        async fn expose_http_service(&self, _id: &str, _name: &str, _port: u16) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn hide_http_service(&self, _id: &str, _name: &str) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn pause(&self, _id: &str) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn resume(&self, _id: &str) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn stop(&self, _id: &str) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn set_wake_on(&self, _id: &str, _connection: bool, _ssh: bool) -> cmux_providers::Result<()> {
            Ok(())
        }

        async fn snapshot(&self, _id: &str) -> cmux_providers::Result<SnapshotResult> {
            unreachable!("not exercised by these tests")
        }
    }

    #[tokio::test]
    async fn desired_ports_prefers_explicit_exposed_ports() {
        let sandbox = FakeSandbox { devcontainer_body: None };
        let ports = desired_ports(&sandbox, "morphvm_abc", &[9000, 8080]).await;
        assert_eq!(ports, vec![8080, 9000]);
    }

    #[tokio::test]
    async fn desired_ports_falls_back_to_devcontainer_forward_ports() {
        let sandbox = FakeSandbox {
            devcontainer_body: Some(r#"{"forwardPorts":[5173,3000]}"#.to_string()),
        };
        let ports = desired_ports(&sandbox, "morphvm_abc", &[]).await;
        assert_eq!(ports, vec![3000, 5173]);
    }

    #[tokio::test]
    async fn desired_ports_is_empty_when_devcontainer_is_absent() {
        let sandbox = FakeSandbox { devcontainer_body: None };
        let ports = desired_ports(&sandbox, "morphvm_abc", &[]).await;
        assert!(ports.is_empty());
    }
}
