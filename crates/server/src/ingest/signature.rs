//! Commerce webhook signature verification.
//!
//! The platform signs the exact raw request body with HMAC-SHA256 and sends
//! the base64 digest in a header. Verification therefore runs over the raw
//! buffered bytes - parse-then-reserialize is a correctness bug.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::IngestError;

type HmacSha256 = Hmac<Sha256>;

/// Verify a platform webhook signature over the raw request body.
///
/// # Errors
///
/// Returns [`IngestError::SignatureInvalid`] on any mismatch.
pub fn verify_webhook_signature(
    secret: &SecretString,
    raw_body: &[u8],
    signature_header: &str,
) -> Result<(), IngestError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| IngestError::SignatureInvalid)?;
    mac.update(raw_body);

    let expected = BASE64.encode(mac.finalize().into_bytes());

    if constant_time_compare(&expected, signature_header) {
        Ok(())
    } else {
        Err(IngestError::SignatureInvalid)
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("valid key length");
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let secret = SecretString::from("whsec_test");
        let body = br##"{"id":1001,"name":"#1001"}"##;
        let header = sign("whsec_test", body);

        assert!(verify_webhook_signature(&secret, body, &header).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let secret = SecretString::from("whsec_test");
        let body = br#"{"id":1001}"#;
        let header = sign("some-other-secret", body);

        assert!(verify_webhook_signature(&secret, body, &header).is_err());
    }

    #[test]
    fn test_reserialized_body_rejected() {
        // Semantically identical JSON with different whitespace/ordering must
        // fail: the signature covers bytes, not meaning.
        let secret = SecretString::from("whsec_test");
        let original = br##"{"id":1001,"name":"#1001"}"##;
        let reserialized = br##"{"name": "#1001", "id": 1001}"##;
        let header = sign("whsec_test", original);

        assert!(verify_webhook_signature(&secret, reserialized, &header).is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let secret = SecretString::from("whsec_test");
        let header = sign("whsec_test", br#"{"total":"1500"}"#);

        assert!(verify_webhook_signature(&secret, br#"{"total":"9999"}"#, &header).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(constant_time_compare("", ""));
    }
}
