//! Mints code-host installation tokens and resolves
//! the best available token for a given repo owner (step 3).

use chrono::{DateTime, Utc};
use cmux_config::schema::CodeHostAppCredentials;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Deserialize;

use crate::{
    app_jwt::mint_app_jwt,
    error::{Error, Result},
    permissions::Permissions,
};

const CODE_HOST_API_BASE_URL: &str = "https://api.github.com";

/// A minted installation token, scoped to whichever repositories/permissions
/// were requested.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub account_login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct CredentialBroker {
    client: reqwest::Client,
    credentials: Option<CodeHostAppCredentials>,
    base_url: String,
}

impl CredentialBroker {
    pub fn new(credentials: Option<CodeHostAppCredentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: CODE_HOST_API_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(credentials: Option<CodeHostAppCredentials>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: base_url.into(),
        }
    }

    /// Mints a token scoped to `installation_id`, optionally narrowed to
    /// `repositories` and always narrowed to `permissions`.
    pub async fn mint_installation_token(
        &self,
        installation_id: &str,
        repositories: Option<&[String]>,
        permissions: Permissions,
        account_login: Option<&str>,
    ) -> Result<InstallationToken> {
        let creds = self.credentials.as_ref().ok_or(Error::NotConfigured)?;
        let app_jwt = mint_app_jwt(&creds.app_id, &creds.private_key_pem, Utc::now().timestamp())?;

        let mut body = serde_json::Map::new();
        if !permissions.is_empty() {
            body.insert("permissions".into(), serde_json::to_value(&permissions).unwrap());
        }
        if let Some(repos) = repositories {
            body.insert("repositories".into(), serde_json::to_value(repos).unwrap());
        }

        let resp = self
            .client
            .post(format!(
                "{}/app/installations/{installation_id}/access_tokens",
                self.base_url
            ))
            .bearer_auth(app_jwt)
            .header("accept", "application/vnd.github+json")
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::CodeHost(format!("installation {installation_id} not found")));
        }
        let resp = resp.error_for_status().map_err(|e| {
            Error::CodeHost(format!("installation token request failed: {e}"))
        })?;

        let raw: RawTokenResponse = resp.json().await?;
        Ok(InstallationToken {
            token: SecretString::from(raw.token),
            expires_at: raw.expires_at,
            account_login: account_login.map(ToOwned::to_owned),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

/// What to authenticate hydration with, once the best option has been
/// chosen.
#[derive(Debug, Clone)]
pub enum ResolvedAuth {
    Installation(SecretString),
    UserOAuth(SecretString),
    None,
}

/// Prefers an installation token whose `accountLogin` case-insensitively
/// matches `repo_owner`; falls back to the caller's user-OAuth token; falls
/// back to no auth (public reads only).
pub fn resolve_best_token(
    repo_owner: &str,
    installation_tokens: &[InstallationToken],
    user_oauth: Option<&SecretString>,
) -> ResolvedAuth {
    if let Some(matched) = installation_tokens.iter().find(|t| {
        t.account_login
            .as_deref()
            .is_some_and(|login| login.eq_ignore_ascii_case(repo_owner))
    }) {
        return ResolvedAuth::Installation(matched.token.clone());
    }
    if let Some(oauth) = user_oauth {
        return ResolvedAuth::UserOAuth(oauth.clone());
    }
    ResolvedAuth::None
}

#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use super::*;

    fn creds() -> CodeHostAppCredentials {
        let pem = include_str!("../tests/fixtures/test_app_key.pem");
        CodeHostAppCredentials {
            app_id: "12345".into(),
            private_key_pem: Secret::new(pem.to_string()),
        }
    }

    #[tokio::test]
    async fn mints_a_token_and_carries_the_expiry_through() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/app/installations/999/access_tokens")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"ghs_abc","expires_at":"2026-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let broker = CredentialBroker::with_base_url(Some(creds()), server.url());
        let token = broker
            .mint_installation_token("999", None, Permissions::new(), Some("acme-corp"))
            .await
            .unwrap();

        assert_eq!(token.account_login.as_deref(), Some("acme-corp"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_installation_maps_to_code_host_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/app/installations/404/access_tokens")
            .with_status(404)
            .create_async()
            .await;

        let broker = CredentialBroker::with_base_url(Some(creds()), server.url());
        let err = broker
            .mint_installation_token("404", None, Permissions::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CodeHost(_)));
    }

    #[tokio::test]
    async fn unconfigured_broker_refuses_to_mint() {
        let broker = CredentialBroker::new(None);
        let err = broker
            .mint_installation_token("1", None, Permissions::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured));
    }

    fn token(login: &str) -> InstallationToken {
        InstallationToken {
            token: SecretString::from(format!("token-for-{login}")),
            expires_at: Utc::now(),
            account_login: Some(login.to_string()),
        }
    }

    #[test]
    fn resolve_prefers_matching_installation_case_insensitively() {
        let tokens = vec![token("Acme-Corp")];
        let resolved = resolve_best_token("acme-corp", &tokens, None);
        assert!(matches!(resolved, ResolvedAuth::Installation(_)));
    }

    #[test]
    fn resolve_falls_back_to_user_oauth() {
        let oauth = SecretString::from("user-oauth-token".to_string());
        let resolved = resolve_best_token("someone-else", &[token("acme-corp")], Some(&oauth));
        assert!(matches!(resolved, ResolvedAuth::UserOAuth(_)));
    }

    #[test]
    fn resolve_falls_back_to_no_auth() {
        let resolved = resolve_best_token("someone-else", &[], None);
        assert!(matches!(resolved, ResolvedAuth::None));
    }
}
