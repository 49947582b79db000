//! Encryption-at-rest implementation of the secret-vault contract:
//! `getValue(storeName, key, {secret})` / `setValue(storeName, key, value,
//! {secret})`.
//!
//! Unlike the password-unseal vault this crate was adapted from, there is no
//! interactive unlock step here: the orchestrator process holds a single
//! master secret (`CMUX_VAULT_SECRET`) for its whole lifetime, so the vault
//! is either configured and immediately usable, or not configured at all.

use base64::Engine;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::{error::VaultError, traits::Cipher, xchacha20::XChaCha20Poly1305Cipher};

#[derive(Debug)]
struct EntryRow {
    value_b64: String,
}

/// Encryption-at-rest secret store, scoped by `(store_name, key)` pairs.
///
/// Generic over [`Cipher`] but defaults to [`XChaCha20Poly1305Cipher`].
pub struct SecretVault<C: Cipher = XChaCha20Poly1305Cipher> {
    pool: SqlitePool,
    cipher: C,
    key: [u8; 32],
}

impl SecretVault<XChaCha20Poly1305Cipher> {
    /// Build a vault from the configured master secret, deriving a 256-bit
    /// key via SHA-256. Returns [`VaultError::NotConfigured`] if `secret` is
    /// empty (an orchestrator should refuse to start the vault rather than
    /// run with a predictable all-zero key).
    pub async fn new(pool: SqlitePool, secret: &str) -> Result<Self, VaultError> {
        Self::with_cipher(pool, secret, XChaCha20Poly1305Cipher).await
    }
}

impl<C: Cipher> SecretVault<C> {
    pub async fn with_cipher(pool: SqlitePool, secret: &str, cipher: C) -> Result<Self, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::NotConfigured);
        }
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vault_entries (
                store_name TEXT NOT NULL,
                key TEXT NOT NULL,
                value_b64 TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (store_name, key)
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, cipher, key })
    }

    fn aad(store_name: &str, key: &str) -> Vec<u8> {
        format!("{store_name}:{key}").into_bytes()
    }

    /// `getValue(storeName, key)` — returns `None` if unset, the decrypted
    /// plaintext otherwise.
    pub async fn get_value(&self, store_name: &str, key: &str) -> Result<Option<String>, VaultError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value_b64 FROM vault_entries WHERE store_name = ? AND key = ?",
        )
        .bind(store_name)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row.map(|(value_b64,)| EntryRow { value_b64 }) else {
            return Ok(None);
        };

        let blob = base64::engine::general_purpose::STANDARD.decode(row.value_b64)?;
        let plaintext = self
            .cipher
            .decrypt(&self.key, &blob, &Self::aad(store_name, key))
            .map_err(|e| VaultError::CipherError(e.to_string()))?;
        Ok(Some(String::from_utf8(plaintext)?))
    }

    /// `setValue(storeName, key, value)` — upserts the encrypted value.
    pub async fn set_value(&self, store_name: &str, key: &str, value: &str) -> Result<(), VaultError> {
        let blob = self
            .cipher
            .encrypt(&self.key, value.as_bytes(), &Self::aad(store_name, key))
            .map_err(|e| VaultError::CipherError(e.to_string()))?;
        let value_b64 = base64::engine::general_purpose::STANDARD.encode(blob);

        sqlx::query(
            "INSERT INTO vault_entries (store_name, key, value_b64, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT(store_name, key) DO UPDATE SET
               value_b64 = excluded.value_b64,
               updated_at = excluded.updated_at",
        )
        .bind(store_name)
        .bind(key)
        .bind(value_b64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a value. Non-fatal if absent.
    pub async fn delete_value(&self, store_name: &str, key: &str) -> Result<(), VaultError> {
        sqlx::query("DELETE FROM vault_entries WHERE store_name = ? AND key = ?")
            .bind(store_name)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// A file-backed pool in a scratch directory, so each test exercises the
    /// same on-disk SQLite path the orchestrator runs against in production.
    /// The `TempDir` must stay alive for the pool's lifetime — dropping it
    /// deletes the file out from under the connection.
    async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vault.db");
        let pool = SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn rejects_empty_secret() {
        let (pool, _dir) = test_pool().await;
        let result = SecretVault::new(pool, "").await;
        assert!(matches!(result, Err(VaultError::NotConfigured)));
    }

    #[tokio::test]
    async fn round_trips_a_value() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();

        vault
            .set_value("env-blobs", "env_abc123", "API_KEY=xyz\nDEBUG=1")
            .await
            .unwrap();

        let got = vault.get_value("env-blobs", "env_abc123").await.unwrap();
        assert_eq!(got.as_deref(), Some("API_KEY=xyz\nDEBUG=1"));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();
        assert_eq!(vault.get_value("env-blobs", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_is_upsert() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();

        vault.set_value("s", "k", "first").await.unwrap();
        vault.set_value("s", "k", "second").await.unwrap();

        assert_eq!(vault.get_value("s", "k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn different_stores_are_isolated() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();

        vault.set_value("store-a", "k", "a-value").await.unwrap();
        vault.set_value("store-b", "k", "b-value").await.unwrap();

        assert_eq!(vault.get_value("store-a", "k").await.unwrap().as_deref(), Some("a-value"));
        assert_eq!(vault.get_value("store-b", "k").await.unwrap().as_deref(), Some("b-value"));
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();

        vault.set_value("s", "k", "v").await.unwrap();
        vault.delete_value("s", "k").await.unwrap();
        assert_eq!(vault.get_value("s", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tampered_ciphertext_is_rejected() {
        let (pool, _dir) = test_pool().await;
        let vault = SecretVault::new(pool, "test-master-secret").await.unwrap();
        vault.set_value("s", "k", "v").await.unwrap();

        sqlx::query("UPDATE vault_entries SET value_b64 = 'AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA==' WHERE store_name = 's' AND key = 'k'")
            .execute(&vault.pool)
            .await
            .unwrap();

        let result = vault.get_value("s", "k").await;
        assert!(result.is_err());
    }
}
