//! Bearer-Token Lifecycle
//!
//! Two halves live here:
//!
//! - **Server side**: [`mint_token`] / [`verify_token`] implement a compact
//!   HMAC-SHA256 signed token (JWT-shaped: header.claims.signature, each
//!   base64url-encoded) carrying a subject and expiry claim.
//! - **Client side**: [`AuthSession`] holds the token plus an expiry derived
//!   from a best-effort *unverified* decode of the `exp` claim. That expiry
//!   is advisory only: it lets the client refuse obviously stale calls
//!   without a round trip, but the server remains the sole authority on
//!   token validity.
//!
//! Session state machine: `NoToken -> Authenticated -> (Expired | LoggedOut)
//! -> NoToken`. An HTTP 401 from any call clears the session.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, SqlsightError};

type HmacSha256 = Hmac<Sha256>;

/// Fixed token header: HMAC-SHA256, JWT framing.
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Claims carried by a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    /// Expiry as a Unix timestamp
    pub exp: i64,
}

fn mac_for(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SqlsightError::invalid_input("invalid token signing secret"))
}

/// Mint a signed token for a subject, valid for `ttl_secs`.
pub fn mint_token(secret: &str, subject: &str, ttl_secs: i64) -> Result<String> {
    let claims = Claims { sub: subject.to_string(), exp: Utc::now().timestamp() + ttl_secs };
    let claims_json = serde_json::to_string(&claims)
        .map_err(|e| SqlsightError::invalid_input(format!("failed to encode claims: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(TOKEN_HEADER.as_bytes()),
        URL_SAFE_NO_PAD.encode(claims_json.as_bytes())
    );

    let mut mac = mac_for(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify a token's signature and expiry, returning its claims.
///
/// Any structural, signature, or expiry problem maps to `Unauthorized`.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims> {
    let invalid = |detail: &str| SqlsightError::Unauthorized(detail.to_string());

    let mut parts = token.splitn(3, '.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) => (h, p, s),
        _ => return Err(invalid("malformed token")),
    };

    let signature_bytes =
        URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid("malformed token signature"))?;

    let mut mac = mac_for(secret)?;
    mac.update(format!("{header}.{payload}").as_bytes());
    mac.verify_slice(&signature_bytes).map_err(|_| invalid("invalid token signature"))?;

    let claims_json =
        URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid("malformed token payload"))?;
    let claims: Claims =
        serde_json::from_slice(&claims_json).map_err(|_| invalid("malformed token claims"))?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(invalid("token expired"));
    }

    Ok(claims)
}

/// Best-effort decode of a token's `exp` claim, without verification.
///
/// Returns `None` for anything that does not look like a decodable token.
/// Advisory only: never a trust boundary.
#[must_use]
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = json.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Client-held bearer token plus its advisory expiry.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    token: Option<String>,
    expiry: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Fresh session with no token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the authenticated state with a token from a successful login.
    ///
    /// The expiry comes from an unverified claim decode; a token whose
    /// claims cannot be decoded yields no expiry, and the session reads as
    /// invalid for local checks (the server may still accept the token).
    pub fn authenticate(&mut self, token: String) {
        self.expiry = decode_expiry(&token);
        self.token = Some(token);
    }

    /// Clear the session (logout, or a 401 from any call).
    pub fn clear(&mut self) {
        self.token = None;
        self.expiry = None;
    }

    /// Advisory validity: a token is held and its expiry is in the future.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (&self.token, self.expiry) {
            (Some(_), Some(expiry)) => Utc::now() < expiry,
            _ => false,
        }
    }

    /// Bearer token for the `Authorization` header, when one is held.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";

    #[test]
    fn test_mint_verify_round_trip() {
        let token = mint_token(SECRET, "admin", 3600).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = mint_token(SECRET, "admin", 3600).unwrap();
        let err = verify_token("other-secret", &token).unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = mint_token(SECRET, "admin", -10).unwrap();
        let err = verify_token(SECRET, &token).unwrap_err();
        assert!(err.message().contains("expired"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = mint_token(SECRET, "admin", 3600).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"root","exp":9999999999}"#);
        parts[1] = &forged;
        let err = verify_token(SECRET, &parts.join(".")).unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(verify_token(SECRET, "not-a-token").is_err());
        assert!(verify_token(SECRET, "a.b").is_err());
    }

    #[test]
    fn test_decode_expiry_matches_claim() {
        let token = mint_token(SECRET, "admin", 3600).unwrap();
        let expiry = decode_expiry(&token).unwrap();
        let delta = expiry.timestamp() - Utc::now().timestamp();
        assert!((3590..=3600).contains(&delta));
    }

    #[test]
    fn test_decode_expiry_garbage_is_none() {
        assert!(decode_expiry("garbage").is_none());
        assert!(decode_expiry("a.b.c").is_none());
    }

    #[test]
    fn test_session_without_token_is_invalid() {
        let session = AuthSession::new();
        assert!(!session.is_valid());
        assert!(session.bearer().is_none());
    }

    #[test]
    fn test_session_with_fresh_token_is_valid() {
        let mut session = AuthSession::new();
        session.authenticate(mint_token(SECRET, "admin", 3600).unwrap());
        assert!(session.is_valid());
        assert!(session.bearer().is_some());
    }

    #[test]
    fn test_session_with_past_expiry_is_invalid() {
        let mut session = AuthSession::new();
        session.authenticate(mint_token(SECRET, "admin", -10).unwrap());
        // The token string is still present, but the session is not valid
        assert!(session.bearer().is_some());
        assert!(!session.is_valid());
    }

    #[test]
    fn test_clear_returns_to_no_token() {
        let mut session = AuthSession::new();
        session.authenticate(mint_token(SECRET, "admin", 3600).unwrap());
        session.clear();
        assert!(!session.is_valid());
        assert!(session.bearer().is_none());
    }

    #[test]
    fn test_undecodable_token_reads_invalid_locally() {
        let mut session = AuthSession::new();
        session.authenticate("opaque-server-token".to_string());
        assert!(!session.is_valid());
        assert!(session.bearer().is_some());
    }
}
