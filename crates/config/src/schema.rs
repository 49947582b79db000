//! Typed shape of the closed environment-variable configuration surface.

use std::fmt;

use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// Which back-end provisions sandboxes. `PveLxc` covers both the `pve-lxc`
/// and `pve-vm` configuration aliases — both name the self-hosted
/// hypervisor-backed LXC path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxProvider {
    Morph,
    PveLxc,
}

impl SandboxProvider {
    /// Parse a configuration value, returning `None` for anything unrecognized
    /// so the caller can apply the "unknown falls back to default, with a
    /// warning" rule.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "morph" => Some(Self::Morph),
            "pve-lxc" | "pve-vm" => Some(Self::PveLxc),
            _ => None,
        }
    }

    /// The instance-id prefixes this provider is expected to produce, used by
    /// `cmux-providers` for the read-path provider-detection rule.
    pub fn id_prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Morph => &["morphvm_"],
            Self::PveLxc => &["pvelxc-", "cmux-"],
        }
    }
}

impl fmt::Display for SandboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Morph => f.write_str("morph"),
            Self::PveLxc => f.write_str("pve-lxc"),
        }
    }
}

/// The default provider a config falls back to when `CMUX_SANDBOX_PROVIDER`
/// is set to an unrecognized value. Named so the fallback is a single
/// documented constant rather than an inline default scattered across call
/// sites.
pub const DEFAULT_SANDBOX_PROVIDER: SandboxProvider = SandboxProvider::Morph;

/// Credentials for the Morph microVM cloud.
#[derive(Clone)]
pub struct MorphCredentials {
    pub api_key: Secret<String>,
}

/// Credentials for the self-hosted Proxmox/LXC back-end.
#[derive(Clone)]
pub struct PveLxcCredentials {
    pub endpoint: String,
    pub token: Secret<String>,
}

/// GitHub App credentials used by the Credential Broker (component B) to
/// mint installation tokens.
#[derive(Clone)]
pub struct CodeHostAppCredentials {
    pub app_id: String,
    pub private_key_pem: Secret<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_provider_values() {
        assert_eq!(SandboxProvider::parse("morph"), Some(SandboxProvider::Morph));
        assert_eq!(SandboxProvider::parse("pve-lxc"), Some(SandboxProvider::PveLxc));
        assert_eq!(SandboxProvider::parse("pve-vm"), Some(SandboxProvider::PveLxc));
        assert_eq!(SandboxProvider::parse("bogus"), None);
    }

    #[test]
    fn id_prefixes_are_disjoint_across_providers() {
        let morph: Vec<&str> = SandboxProvider::Morph.id_prefixes().to_vec();
        let pve: Vec<&str> = SandboxProvider::PveLxc.id_prefixes().to_vec();
        assert!(morph.iter().all(|p| !pve.contains(p)));
    }

    fn empty_config() -> OrchestratorConfig {
        OrchestratorConfig {
            provider_override: None,
            morph: None,
            pve_lxc: None,
            code_host: None,
            vault_secret: None,
            task_run_jwt_secret: None,
            database_url: "sqlite://test.db".into(),
            bind_addr: "0.0.0.0:0".into(),
            log_format: LogFormat::Pretty,
            protected_template_vmids: Vec::new(),
        }
    }

    #[test]
    fn deletable_vmid_respects_reserved_range_and_explicit_protection() {
        let mut cfg = empty_config();
        cfg.protected_template_vmids = vec![500];
        assert!(!cfg.is_deletable_template_vmid(199));
        assert!(!cfg.is_deletable_template_vmid(500));
        assert!(cfg.is_deletable_template_vmid(201));
    }

    #[test]
    fn explicit_override_dominates_credential_autodetect() {
        let mut cfg = empty_config();
        cfg.pve_lxc = Some(PveLxcCredentials {
            endpoint: "https://pve.local".into(),
            token: Secret::new("t".into()),
        });
        cfg.provider_override = Some(SandboxProvider::Morph);
        // Override says morph even though only pve-lxc credentials exist.
        assert_eq!(cfg.active_provider(), Some(SandboxProvider::Morph));
    }

    #[test]
    fn autodetect_falls_back_to_whichever_provider_has_credentials() {
        let mut cfg = empty_config();
        cfg.morph = Some(MorphCredentials {
            api_key: Secret::new("k".into()),
        });
        assert_eq!(cfg.active_provider(), Some(SandboxProvider::Morph));
    }

    #[test]
    fn no_provider_configured_returns_none() {
        assert_eq!(empty_config().active_provider(), None);
    }
}

/// Fully resolved, validated configuration for one orchestrator process.
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Explicit override from `CMUX_SANDBOX_PROVIDER`, if the variable was
    /// set to a recognized value.
    pub provider_override: Option<SandboxProvider>,
    pub morph: Option<MorphCredentials>,
    pub pve_lxc: Option<PveLxcCredentials>,
    pub code_host: Option<CodeHostAppCredentials>,
    pub vault_secret: Option<Secret<String>>,
    pub task_run_jwt_secret: Option<Secret<String>>,
    pub database_url: String,
    pub bind_addr: String,
    pub log_format: LogFormat,
    /// Template vmids the self-hosted delete-environment cleanup must never
    /// tear down, on top of the `< 200` reserved-preset range.
    pub protected_template_vmids: Vec<i64>,
}

/// Template vmids below this value are reserved presets, never deletable
/// regardless of `protected_template_vmids`.
pub const MIN_DELETABLE_TEMPLATE_VMID: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl OrchestratorConfig {
    /// The active provider: explicit override wins;
    /// otherwise auto-detect from which provider has credentials configured.
    /// Returns `None` if neither path yields a usable provider.
    pub fn active_provider(&self) -> Option<SandboxProvider> {
        if let Some(p) = self.provider_override {
            return Some(p);
        }
        if self.morph.is_some() {
            return Some(SandboxProvider::Morph);
        }
        if self.pve_lxc.is_some() {
            return Some(SandboxProvider::PveLxc);
        }
        None
    }

    /// Whether credentials are present for the given provider.
    pub fn has_credentials_for(&self, provider: SandboxProvider) -> bool {
        match provider {
            SandboxProvider::Morph => self.morph.is_some(),
            SandboxProvider::PveLxc => self.pve_lxc.is_some(),
        }
    }

    /// Whether a template vmid is safe to delete: not a reserved preset and
    /// not explicitly protected.
    pub fn is_deletable_template_vmid(&self, vmid: i64) -> bool {
        vmid >= MIN_DELETABLE_TEMPLATE_VMID && !self.protected_template_vmids.contains(&vmid)
    }
}
