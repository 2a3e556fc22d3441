//! Session and CSRF token issuance and verification.
//!
//! A session token is an HS256 JWT carrying the username, its expiry and the
//! CSRF token issued alongside it. The CSRF token is also handed to the
//! browser in a readable cookie and must come back in a header, so a request
//! only verifies when the cookie pair belongs together.
//!
//! Verification is stateless: the signing secret is the only state and it
//! never changes after startup.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::TryRngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Random bytes in a CSRF token before encoding.
pub const CSRF_TOKEN_BYTES: usize = 64;

/// Errors from issuing or verifying tokens.
///
/// Every variant except [`TokenError::Generation`] means "token not valid";
/// callers outside this module must not tell them apart in responses.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signing failed or the entropy source was unavailable.
    #[error("token generation failed: {0}")]
    Generation(String),

    /// Signature did not verify, or the algorithm was not HS256.
    #[error("token signature is invalid")]
    Signature,

    /// Token could not be parsed into session claims.
    #[error("token is malformed")]
    WrongStructure,

    /// The embedded expiry has passed.
    #[error("token has expired")]
    Expired,

    /// The presented CSRF token does not match the embedded one.
    #[error("csrf token mismatch")]
    CsrfMismatch,
}

impl TokenError {
    /// Whether this is a verification failure rather than an issuance failure.
    #[must_use]
    pub const fn is_not_valid(&self) -> bool {
        !matches!(self, Self::Generation(_))
    }
}

/// Claims signed into a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub username: String,
    /// Unix seconds after which the token is rejected.
    pub expires: i64,
    #[serde(rename = "csrf-token")]
    pub csrf_token: String,
    /// Registered `exp` claim, mirrors `expires`.
    pub exp: i64,
}

impl SessionClaims {
    /// Build claims that expire at `expires_at`.
    #[must_use]
    pub fn new(username: impl Into<String>, csrf_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        let expires = expires_at.timestamp();
        Self {
            username: username.into(),
            expires,
            csrf_token: csrf_token.into(),
            exp: expires,
        }
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires, 0)
    }
}

/// Signs and verifies session tokens with a fixed secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a token service for `secret`.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against `expires` in `verify_session_token_at`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        }
    }

    /// Sign `claims` into an opaque token string.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Generation` if signing fails.
    pub fn issue_session_token(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    /// Generate a CSRF token of `length` random bytes, base64url encoded.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Generation` if the OS entropy source fails.
    pub fn issue_csrf_token(&self, length: usize) -> Result<String, TokenError> {
        generate_csrf_token(length)
    }

    /// Verify a session token and its CSRF binding against the current time.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signature`, `WrongStructure`, `Expired` or
    /// `CsrfMismatch` when the token does not verify.
    pub fn verify_session_token(&self, token: &str, presented_csrf: &str) -> Result<SessionClaims, TokenError> {
        self.verify_session_token_at(token, presented_csrf, Utc::now())
    }

    /// Verify a session token as of `now`.
    ///
    /// # Errors
    ///
    /// See [`TokenService::verify_session_token`].
    pub fn verify_session_token_at(
        &self,
        token: &str,
        presented_csrf: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName => TokenError::Signature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::WrongStructure,
            }
        })?;
        let claims = data.claims;

        if now.timestamp() > claims.expires {
            return Err(TokenError::Expired);
        }

        if !constant_time_eq(claims.csrf_token.as_bytes(), presented_csrf.as_bytes()) {
            return Err(TokenError::CsrfMismatch);
        }

        Ok(claims)
    }
}

/// Generate `length` random bytes from the OS and encode them base64url with padding.
///
/// # Errors
///
/// Returns `TokenError::Generation` if the OS entropy source fails.
pub fn generate_csrf_token(length: usize) -> Result<String, TokenError> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError::Generation(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes))
}

/// Constant-time byte comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn service() -> TokenService {
        TokenService::new(&SecretString::from("k9Qz2mV7xR4pL8wN3bT6yH1cF5jD0sGe"))
    }

    fn claims(ttl: Duration) -> SessionClaims {
        let csrf = generate_csrf_token(CSRF_TOKEN_BYTES).unwrap();
        SessionClaims::new("alice", csrf, Utc::now() + ttl)
    }

    #[test]
    fn test_round_trip_returns_original_claims() {
        let tokens = service();
        let claims = claims(Duration::hours(1));
        let token = tokens.issue_session_token(&claims).unwrap();

        let verified = tokens.verify_session_token(&token, &claims.csrf_token).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_claims_json_field_names() {
        let json = serde_json::to_value(SessionClaims::new("bob", "abc", Utc::now())).unwrap();
        assert!(json.get("username").is_some());
        assert!(json.get("expires").is_some());
        assert!(json.get("csrf-token").is_some());
        assert_eq!(json["exp"], json["expires"]);
    }

    #[test]
    fn test_any_mutation_is_rejected() {
        let tokens = service();
        let claims = claims(Duration::hours(1));
        let token = tokens.issue_session_token(&claims).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        // Flip a character in the middle of each segment.
        for segment in 0..3 {
            let mut mutated: Vec<String> = parts.iter().map(|p| (*p).to_owned()).collect();
            let target = &mut mutated[segment];
            let mid = target.len() / 2;
            let original = target.as_bytes()[mid];
            let replacement = if original == b'A' { 'B' } else { 'A' };
            target.replace_range(mid..=mid, &replacement.to_string());
            let mutated = mutated.join(".");

            let err = tokens
                .verify_session_token(&mutated, &claims.csrf_token)
                .unwrap_err();
            assert!(err.is_not_valid(), "segment {segment} mutation accepted");
        }
    }

    #[test]
    fn test_wrong_secret_is_signature_error() {
        let claims = claims(Duration::hours(1));
        let token = service().issue_session_token(&claims).unwrap();

        let other = TokenService::new(&SecretString::from("Zx8vB3nM6qW1eR5tY9uI2oP4aS7dF0gH"));
        let err = other.verify_session_token(&token, &claims.csrf_token).unwrap_err();
        assert!(matches!(err, TokenError::Signature));
    }

    #[test]
    fn test_csrf_must_match_exactly() {
        let tokens = service();
        let claims = claims(Duration::hours(1));
        let token = tokens.issue_session_token(&claims).unwrap();

        let truncated = claims.csrf_token[1..].to_owned();
        let padded = format!("{} ", claims.csrf_token);
        for presented in ["", "nope", truncated.as_str(), padded.as_str()] {
            let err = tokens.verify_session_token(&token, presented).unwrap_err();
            assert!(matches!(err, TokenError::CsrfMismatch));
        }
    }

    #[test]
    fn test_already_expired_token() {
        let tokens = service();
        let claims = claims(Duration::seconds(-1));
        let token = tokens.issue_session_token(&claims).unwrap();

        let err = tokens.verify_session_token(&token, &claims.csrf_token).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn test_expiry_is_checked_before_csrf() {
        let tokens = service();
        let claims = claims(Duration::minutes(5));
        let token = tokens.issue_session_token(&claims).unwrap();

        let later = Utc::now() + Duration::minutes(10);
        let err = tokens
            .verify_session_token_at(&token, "wrong", later)
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn test_garbage_is_wrong_structure() {
        let err = service().verify_session_token("not-a-token", "x").unwrap_err();
        assert!(matches!(err, TokenError::WrongStructure));
    }

    #[test]
    fn test_csrf_token_length_and_alphabet() {
        let token = generate_csrf_token(CSRF_TOKEN_BYTES).unwrap();
        // 64 bytes -> 88 base64 characters including padding.
        assert_eq!(token.len(), 88);
        assert!(!token.contains('+') && !token.contains('/'));
        assert_ne!(token, generate_csrf_token(CSRF_TOKEN_BYTES).unwrap());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
    }
}
