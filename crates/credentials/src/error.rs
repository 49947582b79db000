//! Credential Broker errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no code-host app credentials are configured")]
    NotConfigured,

    #[error("failed to sign app jwt: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("code host rejected the token request: {0}")]
    CodeHost(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("container auth install failed after retries: {0}")]
    InstallFailed(String),

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
