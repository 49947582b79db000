//! Provider adapter errors. The Lifecycle Controller maps these to
//! sanitized HTTP responses rather than propagating raw provider text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("instance not found")]
    NotFound,

    #[error("provider request timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("dns resolution failed")]
    DnsFailure,

    #[error("quota or capacity exceeded")]
    QuotaExceeded,

    #[error("snapshot not found or invalid")]
    SnapshotInvalid,

    #[error("provider authentication failed")]
    AuthFailure,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("instance failed to start")]
    StartFailed,

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl cmux_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cmux_common::impl_context!();
