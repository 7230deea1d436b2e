//! Opaque session token binding: `{ subject: playerId, roomId,
//! sessionId, exp }`, HMAC-SHA256 signed and base64-encoded.
//!
//! Grounded on `crate::security::token_binding`'s `ActiveTokenBinding` —
//! same `hmac`/`sha2`/constant-time-compare shape, generalized from
//! signing a WebSocket handshake payload to signing this crate's own
//! claims struct. No JWT library is used: a bespoke HMAC envelope over
//! a small fixed-shape struct is simpler than adopting a new dependency
//! for header/claims negotiation this server doesn't need.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::protocol::types::{PlayerId, RoomId, SessionId};

type HmacSha256 = Hmac<Sha256>;

/// A token is eligible for proactive re-issue once its remaining
/// lifetime drops to this many milliseconds, so a long-lived connection
/// never has to fully re-authenticate mid-session.
pub const REFRESH_THRESHOLD_MS: i64 = 5 * 60 * 1000;

/// The claims bound into every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub subject: PlayerId,
    pub room_id: RoomId,
    pub session_id: SessionId,
    /// Unix millis expiry.
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid base64/json")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

/// Signs and verifies [`SessionClaims`] with a server-held HMAC key.
#[derive(Clone)]
pub struct SessionTokenService {
    secret: Arc<[u8]>,
}

impl SessionTokenService {
    pub fn new(secret: impl Into<Arc<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a signed token for `claims`, as `"<payload_b64>.<sig_b64>"`.
    pub fn issue(&self, claims: &SessionClaims) -> String {
        let payload = serde_json::to_vec(claims).expect("SessionClaims is always serializable");
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
        let signature = self.sign(payload_b64.as_bytes());
        format!("{payload_b64}.{signature}")
    }

    /// Verify and decode a token issued by [`Self::issue`]. Checks the
    /// signature before ever deserializing, and expiry after.
    pub fn verify(&self, token: &str, now_ms: i64) -> Result<SessionClaims, TokenError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;

        let expected = self.sign(payload_b64.as_bytes());
        if !bool::from(expected.as_bytes().ct_eq(signature_b64.as_bytes())) {
            return Err(TokenError::BadSignature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.exp < now_ms {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// `true` once `claims.exp` is within [`REFRESH_THRESHOLD_MS`] of
    /// `now_ms` (but not yet expired — an already-expired token is
    /// rejected by [`Self::verify`], not refreshed).
    pub fn needs_refresh(claims: &SessionClaims, now_ms: i64) -> bool {
        claims.exp > now_ms && claims.exp - now_ms <= REFRESH_THRESHOLD_MS
    }

    /// Re-issue a token for the same claims with a new expiry, carrying
    /// the session forward without requiring the client to rejoin.
    pub fn refresh(&self, claims: &SessionClaims, new_exp_ms: i64) -> String {
        self.issue(&SessionClaims {
            exp: new_exp_ms,
            ..claims.clone()
        })
    }

    fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts a key of any length");
        mac.update(payload);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn service() -> SessionTokenService {
        SessionTokenService::new(Arc::from(b"test-secret-key-material".as_slice()))
    }

    fn sample_claims(exp: i64) -> SessionClaims {
        SessionClaims {
            subject: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            exp,
        }
    }

    #[test]
    fn round_trips_claims() {
        let service = service();
        let claims = sample_claims(i64::MAX);
        let token = service.issue(&claims);
        let decoded = service.verify(&token, 0).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_tampered_payload() {
        let service = service();
        let token = service.issue(&sample_claims(i64::MAX));
        let (payload, sig) = token.split_once('.').unwrap();
        let tampered = format!("{}x.{}", payload, sig);
        assert_eq!(service.verify(&tampered, 0), Err(TokenError::BadSignature));
    }

    #[test]
    fn rejects_expired_token() {
        let service = service();
        let token = service.issue(&sample_claims(100));
        assert_eq!(service.verify(&token, 1_000), Err(TokenError::Expired));
    }

    #[test]
    fn needs_refresh_only_within_threshold_and_before_expiry() {
        let claims = sample_claims(1_000_000);
        assert!(!SessionTokenService::needs_refresh(&claims, 0));
        assert!(SessionTokenService::needs_refresh(
            &claims,
            1_000_000 - REFRESH_THRESHOLD_MS + 1
        ));
        assert!(!SessionTokenService::needs_refresh(&claims, 1_000_001));
    }

    #[test]
    fn refresh_issues_a_verifiable_token_with_new_expiry() {
        let service = service();
        let claims = sample_claims(1_000);
        let refreshed_token = service.refresh(&claims, 2_000_000);
        let decoded = service.verify(&refreshed_token, 1_500_000).unwrap();
        assert_eq!(decoded.subject, claims.subject);
        assert_eq!(decoded.exp, 2_000_000);
    }

    #[test]
    fn different_secrets_do_not_cross_verify() {
        let service_a = service();
        let service_b = SessionTokenService::new(Arc::from(b"different-secret".as_slice()));
        let token = service_a.issue(&sample_claims(i64::MAX));
        assert_eq!(
            service_b.verify(&token, 0),
            Err(TokenError::BadSignature)
        );
    }
}
