//! Vault error types.

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No master secret configured (`CMUX_VAULT_SECRET` unset); the vault
    /// refuses to run with an all-zero key.
    #[error("vault master secret not configured")]
    NotConfigured,

    /// The `(storeName, key)` pair has no stored value.
    #[error("key not found")]
    NotFound,

    /// Encryption or decryption failed (tampered data, wrong key).
    #[error("cipher error: {0}")]
    CipherError(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// UTF-8 decoding of a decrypted value failed.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
