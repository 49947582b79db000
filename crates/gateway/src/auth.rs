//! Caller resolution at the HTTP boundary: cookie, bearer token, or a
//! paired-header fallback, each producing the same `(userId, accessToken)`
//! shape the rest of the gateway operates on. Decoding what a session cookie
//! or bearer token actually *means* upstream (its issuing identity
//! provider) is someone else's concern; this boundary only extracts the
//! wire pair so downstream handlers never see transport details.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
};
use cmux_common::UserId;
use secrecy::SecretString;

pub const SESSION_COOKIE: &str = "cmux_session";
pub const TOKEN_PAIR_HEADER: &str = "x-cmux-token-pair";

/// A resolved caller identity: who they are and the access token to present
/// to collaborators on their behalf (e.g. minting installation tokens, or
/// returning an `sshCommand` to a CLI caller).
pub struct Caller {
    pub user_id: UserId,
    pub access_token: SecretString,
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(cookie_header) = parts.headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
            && let Some(raw) = parse_cookie(cookie_header, SESSION_COOKIE)
            && let Some(caller) = parse_pair(raw)
        {
            return Ok(caller);
        }

        if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
            && let Some(raw) = auth_header.strip_prefix("Bearer ")
            && let Some(caller) = parse_pair(raw)
        {
            return Ok(caller);
        }

        if let Some(raw) = parts.headers.get(TOKEN_PAIR_HEADER).and_then(|v| v.to_str().ok())
            && let Some(caller) = parse_pair(raw)
        {
            return Ok(caller);
        }

        Err((StatusCode::UNAUTHORIZED, "missing or unrecognized caller credentials"))
    }
}

/// `<userId>:<accessToken>`, the one wire shape shared by all three
/// transports named at the boundary.
fn parse_pair(raw: &str) -> Option<Caller> {
    let (user_id, token) = raw.split_once(':')?;
    if user_id.is_empty() || token.is_empty() {
        return None;
    }
    Some(Caller {
        user_id: UserId::from(user_id.to_string()),
        access_token: SecretString::from(token.to_string()),
    })
}

fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_finds_named_value_among_others() {
        assert_eq!(parse_cookie("cmux_session=abc; other=def", SESSION_COOKIE), Some("abc"));
        assert_eq!(parse_cookie("other=def; cmux_session=xyz", SESSION_COOKIE), Some("xyz"));
        assert_eq!(parse_cookie("other=def", SESSION_COOKIE), None);
    }

    #[test]
    fn parse_pair_splits_on_first_colon() {
        let caller = parse_pair("user_1:tok:with:colons").expect("parses");
        assert_eq!(caller.user_id.as_ref(), "user_1");
    }

    #[test]
    fn parse_pair_rejects_malformed_input() {
        assert!(parse_pair("no-colon-here").is_none());
        assert!(parse_pair(":missing-user").is_none());
        assert!(parse_pair("missing-token:").is_none());
    }
}
