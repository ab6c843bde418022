//! Session token issuance.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::SigningSecret;
use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated account.
    pub actor_id: String,
    /// Kind of actor, e.g. `customer`.
    pub actor_type: String,
    /// The modern credential the session was established with.
    pub auth_identity_id: String,
}

/// Turns claims into a bearer token.
pub trait TokenSigner: Send + Sync {
    /// Sign `claims` with `secret`, valid for `ttl`.
    fn sign(
        &self,
        claims: &Claims,
        secret: &SigningSecret,
        ttl: Duration,
    ) -> Result<String, TokenError>;
}

#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(flatten)]
    claims: Claims,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Compact JWT signed with HMAC-SHA256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hs256Signer;

impl Hs256Signer {
    /// Check a token's signature and expiry and return its claims.
    pub fn verify(&self, token: &str, secret: &SigningSecret) -> Result<Claims, TokenError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(TokenError::Malformed),
        };

        let header: Header = serde_json::from_slice(&decode_segment(header_b64)?)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let mut mac = new_mac(secret)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&decode_segment(signature_b64)?)
            .map_err(|_| TokenError::BadSignature)?;

        let payload: Payload = serde_json::from_slice(&decode_segment(payload_b64)?)?;
        if payload.exp <= now_secs() {
            return Err(TokenError::Expired);
        }
        Ok(payload.claims)
    }
}

impl TokenSigner for Hs256Signer {
    fn sign(
        &self,
        claims: &Claims,
        secret: &SigningSecret,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let iat = now_secs();
        let payload = Payload {
            claims: claims.clone(),
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?)
        );

        let mut mac = new_mac(secret)?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }
}

fn new_mac(secret: &SigningSecret) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret.expose()).map_err(|_| TokenError::InvalidKey)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)
}

/// Current epoch seconds.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
