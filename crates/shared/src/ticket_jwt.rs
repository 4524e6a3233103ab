//! Signed ticket verification payloads as HS256 JWTs.
//!
//! The payload is what a scanner checks offline: it names the ticket code,
//! the registration and the event, and expires when the event ends.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Clock skew tolerated when checking `exp`.
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Error type for ticket token operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketJwtError {
    #[error("Failed to encode ticket token: {0}")]
    EncodingError(String),

    #[error("Failed to decode ticket token: {0}")]
    DecodingError(String),

    #[error("Ticket token has expired")]
    TokenExpired,

    #[error("Invalid ticket token")]
    InvalidToken,
}

/// Claims of a ticket verification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaims {
    /// Ticket code
    pub sub: String,
    pub registration_id: Uuid,
    pub event_id: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl TicketClaims {
    pub fn new(ticket_code: &str, registration_id: Uuid, event_id: Uuid, exp: i64) -> Self {
        Self {
            sub: ticket_code.to_string(),
            registration_id,
            event_id,
            exp,
        }
    }

    pub fn ticket_code(&self) -> &str {
        &self.sub
    }
}

/// Signs and checks ticket tokens with a shared secret.
#[derive(Clone)]
pub struct TicketSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub leeway_secs: u64,
}

impl std::fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSigner")
            .field("leeway_secs", &self.leeway_secs)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl TicketSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    pub fn sign(&self, claims: &TicketClaims) -> Result<String, TicketJwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TicketJwtError::EncodingError(e.to_string()))
    }

    /// Checks the signature and expiry and returns the claims.
    pub fn verify(&self, token: &str) -> Result<TicketClaims, TicketJwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        decode::<TicketClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TicketJwtError::TokenExpired,
                ErrorKind::InvalidToken | ErrorKind::InvalidSignature => {
                    TicketJwtError::InvalidToken
                }
                _ => TicketJwtError::DecodingError(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"ticket-signing-secret";
    const FAR_FUTURE: i64 = 4_102_444_800; // 2100-01-01

    fn sample_claims() -> TicketClaims {
        TicketClaims::new(
            "TKT-ABCDEFGHJKLMNPQR",
            Uuid::new_v4(),
            Uuid::new_v4(),
            FAR_FUTURE,
        )
    }

    #[test]
    fn test_token_verifies_with_same_secret() {
        let signer = TicketSigner::new(SECRET);
        let claims = sample_claims();
        let token = signer.sign(&claims).unwrap();

        assert_eq!(token.split('.').count(), 3);
        let decoded = signer.verify(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.ticket_code(), "TKT-ABCDEFGHJKLMNPQR");
    }

    #[test]
    fn test_token_rejected_with_other_secret() {
        let token = TicketSigner::new(SECRET).sign(&sample_claims()).unwrap();
        assert_eq!(
            TicketSigner::new(b"another-secret").verify(&token),
            Err(TicketJwtError::InvalidToken)
        );
    }

    #[test]
    fn test_tampered_claims_are_rejected() {
        let signer = TicketSigner::new(SECRET);
        let token = signer.sign(&sample_claims()).unwrap();
        let signature = token.rsplit('.').next().unwrap();

        let mut forged = sample_claims();
        forged.sub = "TKT-ZZZZZZZZZZZZZZZZ".to_string();
        let forged_token = signer.sign(&forged).unwrap();
        let (forged_head, _) = forged_token.rsplit_once('.').unwrap();

        let spliced = format!("{}.{}", forged_head, signature);
        assert_eq!(signer.verify(&spliced), Err(TicketJwtError::InvalidToken));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let signer = TicketSigner::new(SECRET);
        let mut claims = sample_claims();
        claims.exp = 1_600_000_000;
        let token = signer.sign(&claims).unwrap();

        assert_eq!(signer.verify(&token), Err(TicketJwtError::TokenExpired));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let signer = TicketSigner::new(SECRET);
        assert!(signer.verify("").is_err());
        assert!(signer.verify("no-dots-here").is_err());
        assert!(signer.verify("TKT-ABCDEFGHJKLMNPQR").is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", TicketSigner::new(SECRET));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ticket-signing-secret"));
    }
}
