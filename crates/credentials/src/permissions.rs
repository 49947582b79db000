//! The permission-key vocabulary recognized when minting an installation
//! token. Stored as string pairs so unrecognized
//! keys are a caller bug, not a silent passthrough — only [`Permissions`]
//! construction can set them.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Read,
    Write,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// A builder over the recognized GitHub App installation-token permission
/// keys. Serializes to the `{"contents":"write",...}` map the code-host API
/// expects.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Permissions(BTreeMap<&'static str, &'static str>);

macro_rules! permission_setter {
    ($name:ident, $key:literal) => {
        pub fn $name(mut self, level: Level) -> Self {
            self.0.insert($key, level.as_str());
            self
        }
    };
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    permission_setter!(contents, "contents");
    permission_setter!(pull_requests, "pull_requests");
    permission_setter!(workflows, "workflows");
    permission_setter!(issues, "issues");
    permission_setter!(checks, "checks");
    permission_setter!(actions, "actions");
    permission_setter!(deployments, "deployments");
    permission_setter!(statuses, "statuses");

    /// `metadata: read` is the one permission with no write variant.
    pub fn metadata_read(mut self) -> Self {
        self.0.insert("metadata", "read");
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The exact permission set the Lifecycle Controller requests when resolving
/// git auth for hydration.
pub fn hydration_permissions() -> Permissions {
    Permissions::new()
        .contents(Level::Write)
        .metadata_read()
        .workflows(Level::Write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydration_permissions_match_the_required_set() {
        let value = serde_json::to_value(hydration_permissions()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"contents": "write", "metadata": "read", "workflows": "write"})
        );
    }

    #[test]
    fn empty_permissions_serialize_to_an_empty_object() {
        assert!(Permissions::new().is_empty());
    }
}
