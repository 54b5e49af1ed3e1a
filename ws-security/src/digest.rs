//! UsernameToken password digest
//!
//! `digest = base64(sha1(nonce_bytes || created || password))`

use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use crate::error::WsSecurityError;

/// Digest over raw nonce bytes. Used when generating a token.
pub fn digest_raw(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Digest over a Base64 nonce as it appears on the wire. Used when validating.
pub fn compute_digest(
    nonce_b64: &str,
    created: &str,
    password: &str,
) -> Result<String, WsSecurityError> {
    let nonce_bytes = STANDARD
        .decode(nonce_b64)
        .map_err(|_| WsSecurityError::InvalidNonce)?;
    Ok(digest_raw(&nonce_bytes, created, password))
}

/// Constant-time comparison of two Base64 digests
pub fn verify_digest(expected: &str, actual: &str) -> bool {
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // Worked example from the UsernameToken profile
        let digest = compute_digest(
            "LKqI6G/AikKCQrN0zqZFlg==",
            "2010-09-16T07:50:45Z",
            "userpassword",
        )
        .unwrap();
        assert_eq!(digest, "tuOSpGlFlIXsozq4HFNeeGeFLEI=");
    }

    #[test]
    fn test_raw_and_b64_agree() {
        let nonce = [7u8; 16];
        let b64 = STANDARD.encode(nonce);
        let created = "2024-05-01T10:00:00Z";
        assert_eq!(
            digest_raw(&nonce, created, "pw"),
            compute_digest(&b64, created, "pw").unwrap()
        );
    }

    #[test]
    fn test_verify_digest() {
        assert!(verify_digest("abc=", "abc="));
        assert!(!verify_digest("abc=", "abd="));
    }

    #[test]
    fn test_invalid_nonce() {
        let result = compute_digest("not_valid_base64!!!", "2024-01-01T00:00:00Z", "password");
        assert!(matches!(result, Err(WsSecurityError::InvalidNonce)));
    }
}
