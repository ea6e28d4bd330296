//! Webhook authenticity verification.
//!
//! LiveKit signs every webhook with an HS256 JWT in the `Authorization`
//! header. The token is issued by the API key, signed with the API secret,
//! and carries a `sha256` claim holding the base64 SHA-256 digest of the
//! request body. The body is only decoded after both checks pass.

use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::domain::WebhookEvent;
use crate::error::HubError;

/// Verification failures.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No `Authorization` header was sent.
    #[error("missing authorization header")]
    MissingAuthorization,

    /// The token is malformed, expired, wrongly signed or from another key.
    #[error("invalid webhook token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// The token does not vouch for this body.
    #[error("body digest mismatch")]
    DigestMismatch,

    /// The body is not a valid event.
    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

impl From<VerifyError> for HubError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Decode(e) => Self::Decode(e.to_string()),
            other => Self::Auth(other.to_string()),
        }
    }
}

/// Checks a webhook request and decodes its event.
pub trait EventVerifier: Send + Sync + fmt::Debug {
    /// Verifies `headers`/`body` and returns the decoded event.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] if the authenticity proof is missing or
    /// invalid, or the payload does not decode.
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct WebhookClaims {
    #[serde(default)]
    sha256: String,
}

/// Verifies LiveKit webhook tokens for a single API key/secret pair.
pub struct TokenVerifier {
    api_key: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Creates a verifier accepting tokens issued by `api_key` and signed
    /// with `api_secret`.
    #[must_use]
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[api_key]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        Self {
            api_key: api_key.to_string(),
            decoding_key: DecodingKey::from_secret(api_secret.as_bytes()),
            validation,
        }
    }
}

impl EventVerifier for TokenVerifier {
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, VerifyError> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(VerifyError::MissingAuthorization)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header);

        let claims =
            jsonwebtoken::decode::<WebhookClaims>(token, &self.decoding_key, &self.validation)?
                .claims;

        let digest = STANDARD.encode(Sha256::digest(body));
        if !constant_time_eq(digest.as_bytes(), claims.sha256.as_bytes()) {
            return Err(VerifyError::DigestMismatch);
        }

        Ok(serde_json::from_slice(body)?)
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
