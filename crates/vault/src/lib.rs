//! Encryption-at-rest secret vault using XChaCha20-Poly1305.
//!
//! A single master secret (`CMUX_VAULT_SECRET`) is hashed into a 256-bit key
//! at startup; there is no seal/unseal step. Trait-based [`Cipher`] design
//! allows swapping the encryption backend.

pub mod error;
pub mod traits;
pub mod vault;
pub mod xchacha20;

pub use {error::VaultError, traits::Cipher, vault::SecretVault, xchacha20::XChaCha20Poly1305Cipher};
