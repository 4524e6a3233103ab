//! Cryptographic utilities for signing and random token generation.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes HMAC-SHA256 of `message` keyed with `secret`, hex encoded.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex encoded HMAC-SHA256 signature in constant time.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&signature).is_ok()
}

/// Draws `len` symbols from `alphabet` using the operating system CSPRNG.
pub fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            mac,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_hmac_roundtrip() {
        let sig = hmac_sha256_hex(b"secret", b"payload");
        assert!(verify_hmac_sha256_hex(b"secret", b"payload", &sig));
        assert!(!verify_hmac_sha256_hex(b"other", b"payload", &sig));
        assert!(!verify_hmac_sha256_hex(b"secret", b"payload2", &sig));
    }

    #[test]
    fn test_verify_hmac_rejects_garbage() {
        assert!(!verify_hmac_sha256_hex(b"secret", b"payload", "not-hex"));
        assert!(!verify_hmac_sha256_hex(b"secret", b"payload", ""));
    }

    #[test]
    fn test_random_string_uses_alphabet() {
        let value = random_string(b"AB", 64);
        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c == 'A' || c == 'B'));
    }
}
