//! The orchestrator's error taxonomy, tagged so the gateway boundary can map
//! each variant to exactly one HTTP status without inspecting messages.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    Quota,
    SnapshotInvalid,
    AuthFailure,
    RateLimit,
    StartFailed,
}

impl UpstreamErrorKind {
    /// Sanitized, stable text for the taxonomy-tagged 500 body.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::DnsFailure => "dns failure",
            Self::Quota => "quota or capacity exceeded",
            Self::SnapshotInvalid => "snapshot not found or invalid",
            Self::AuthFailure => "auth failure against provider",
            Self::RateLimit => "rate limit exceeded",
            Self::StartFailed => "instance failed to start",
        }
    }
}

impl From<cmux_providers::Error> for UpstreamErrorKind {
    fn from(err: cmux_providers::Error) -> Self {
        match err {
            cmux_providers::Error::Timeout => Self::Timeout,
            cmux_providers::Error::ConnectionRefused => Self::ConnectionRefused,
            cmux_providers::Error::DnsFailure => Self::DnsFailure,
            cmux_providers::Error::QuotaExceeded => Self::Quota,
            cmux_providers::Error::SnapshotInvalid => Self::SnapshotInvalid,
            cmux_providers::Error::AuthFailure => Self::AuthFailure,
            cmux_providers::Error::RateLimited => Self::RateLimit,
            _ => Self::StartFailed,
        }
    }
}

/// Patterns that disqualify an upstream message from being surfaced
/// verbatim, even after the taxonomy tag is attached.
const SENSITIVE_WORDS: &[&str] = &["token", "secret", "bearer", "sk_"];

/// Strips file paths and URLs, then suppresses the message entirely if a
/// sensitive word survives.
pub fn sanitize_upstream_message(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if SENSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return "upstream error (details withheld)".to_string();
    }
    let no_urls = strip_urls(raw);
    strip_paths(&no_urls)
}

fn strip_urls(input: &str) -> String {
    let re = regex::Regex::new(r"[a-zA-Z][a-zA-Z0-9+.-]*://\S+").expect("valid regex");
    re.replace_all(input, "[url]").into_owned()
}

fn strip_paths(input: &str) -> String {
    let re = regex::Regex::new(r"(?:/[\w.\-]+){2,}").expect("valid regex");
    re.replace_all(input, "[path]").into_owned()
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("authentication required")]
    Auth,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream failure: {kind:?}: {message}")]
    Upstream {
        kind: UpstreamErrorKind,
        message: String,
    },

    #[error("provider not configured")]
    NotConfigured,

    #[error("gateway timeout")]
    GatewayTimeout,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn upstream(kind: UpstreamErrorKind, raw_message: impl AsRef<str>) -> Self {
        Self::Upstream {
            kind,
            message: sanitize_upstream_message(raw_message.as_ref()),
        }
    }
}

impl From<cmux_providers::Error> for OrchestratorError {
    fn from(err: cmux_providers::Error) -> Self {
        match err {
            cmux_providers::Error::NotFound => Self::NotFound,
            other => {
                let kind = UpstreamErrorKind::from(clone_provider_error(&other));
                let message = other.to_string();
                Self::upstream(kind, message)
            }
        }
    }
}

/// `cmux_providers::Error` doesn't implement `Clone` (it wraps
/// non-`Clone` transport errors); build a matching tag-only copy for the
/// `From` conversion above rather than threading the original through.
fn clone_provider_error(err: &cmux_providers::Error) -> cmux_providers::Error {
    use cmux_providers::Error::*;
    match err {
        NotFound => NotFound,
        Timeout => Timeout,
        ConnectionRefused => ConnectionRefused,
        DnsFailure => DnsFailure,
        QuotaExceeded => QuotaExceeded,
        SnapshotInvalid => SnapshotInvalid,
        AuthFailure => AuthFailure,
        RateLimited => RateLimited,
        StartFailed | Http(_) | Message { .. } => StartFailed,
    }
}

impl From<cmux_store::Error> for OrchestratorError {
    fn from(err: cmux_store::Error) -> Self {
        match err {
            cmux_store::Error::NotFound => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<cmux_vault::VaultError> for OrchestratorError {
    fn from(err: cmux_vault::VaultError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<cmux_credentials::Error> for OrchestratorError {
    fn from(err: cmux_credentials::Error) -> Self {
        match err {
            cmux_credentials::Error::NotConfigured => Self::NotConfigured,
            other => Self::upstream(UpstreamErrorKind::AuthFailure, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_from_sanitized_messages() {
        let out = sanitize_upstream_message("failed to reach https://internal.example.com/api");
        assert!(!out.contains("https://"));
    }

    #[test]
    fn strips_paths_from_sanitized_messages() {
        let out = sanitize_upstream_message("open /var/lib/cmux/data failed");
        assert!(!out.contains("/var/lib"));
    }

    #[test]
    fn suppresses_messages_containing_sensitive_words() {
        let out = sanitize_upstream_message("invalid bearer token abc123");
        assert_eq!(out, "upstream error (details withheld)");
    }

    #[test]
    fn benign_message_passes_through_unchanged() {
        let out = sanitize_upstream_message("connection reset by peer");
        assert_eq!(out, "connection reset by peer");
    }
}
