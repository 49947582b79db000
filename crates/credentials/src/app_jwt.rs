//! Signs the short-lived app-level JWT used to authenticate as the code-host
//! app itself, ahead of exchanging it for an installation token. Mirrors the
//! HS256 JWT-minting shape used elsewhere in this workspace, swapped to
//! RS256 over the app's private key.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::Result;

/// Clock skew tolerance GitHub recommends backdating `iat` by.
const CLOCK_SKEW_SECONDS: i64 = 60;
const APP_JWT_TTL_SECONDS: i64 = 9 * 60;

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

pub fn mint_app_jwt(app_id: &str, private_key_pem: &SecretString, now_unix: i64) -> Result<String> {
    let claims = AppClaims {
        iat: now_unix - CLOCK_SKEW_SECONDS,
        exp: now_unix + APP_JWT_TTL_SECONDS,
        iss: app_id.to_string(),
    };
    let key = EncodingKey::from_rsa_pem(private_key_pem.expose_secret().as_bytes())?;
    let token = encode(&Header::new(Algorithm::RS256), &claims, &key)?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    // A throwaway 2048-bit RSA test key, not used anywhere outside this test.
    const TEST_PRIVATE_KEY: &str = include_str!("../tests/fixtures/test_app_key.pem");

    #[test]
    fn mints_a_well_formed_rs256_jwt() {
        let key = SecretString::from(TEST_PRIVATE_KEY.to_string());
        let token = mint_app_jwt("12345", &key, 1_700_000_000).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }
}
