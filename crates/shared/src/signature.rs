//! Payment provider webhook signature verification.
//!
//! The provider signs each notification with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]` where the HMAC-SHA256 is
//! computed over `"<t>.<raw body>"` with the shared webhook secret.
//! Multiple `v1` entries appear while the provider rotates secrets.

use thiserror::Error;

use crate::crypto::{hmac_sha256_hex, verify_hmac_sha256_hex};

/// Errors from signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing or malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("No signature matched")]
    Mismatch,
}

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parses `t=...,v1=...` pairs. Unknown schemes are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::MalformedHeader)?;
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::MalformedHeader)?,
                    )
                }
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Ok(Self {
                timestamp,
                signatures,
            }),
            _ => Err(SignatureError::MalformedHeader),
        }
    }
}

/// Verifies a raw notification body against its signature header.
///
/// `now` is unix seconds; `tolerance_secs` bounds replay of captured payloads.
pub fn verify_provider_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let parsed = SignatureHeader::parse(header)?;

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let signed = signed_message(parsed.timestamp, body);
    if parsed
        .signatures
        .iter()
        .any(|sig| verify_hmac_sha256_hex(secret.as_bytes(), &signed, sig))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Builds a signature header for a body. Used by tests and local tooling.
pub fn sign_provider_payload(body: &[u8], secret: &str, timestamp: i64) -> String {
    let signed = signed_message(timestamp, body);
    format!(
        "t={},v1={}",
        timestamp,
        hmac_sha256_hex(secret.as_bytes(), &signed)
    )
}

fn signed_message(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut signed = format!("{}.", timestamp).into_bytes();
    signed.extend_from_slice(body);
    signed
}
