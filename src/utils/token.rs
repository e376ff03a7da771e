//! Random identifier and opaque-credential generation, plus the digest
//! helpers used to locate credentials at rest without storing them verbatim.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Byte length of short identifiers (token ids, session ids): 128 bits.
pub const ID_BYTES: usize = 16;

/// Byte length of opaque credentials (authorization codes, reset tokens):
/// 256 bits.
pub const CREDENTIAL_BYTES: usize = 32;

/// Generate a URL-safe random identifier with 128 bits of entropy.
///
/// Used for `jti` claims and session ids. The result is 22 base64url
/// characters.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a URL-safe opaque credential with 256 bits of entropy.
///
/// Used for authorization codes, password-reset and email-verification
/// tokens. The result is 43 base64url characters.
pub fn generate_credential() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token or credential with SHA-256 for storage.
///
/// Tokens are high-entropy random values, so a fast unsalted digest is
/// sufficient and keeps record lookup a single indexed query.
///
/// # Arguments
/// * `token` - The plain text token to hash
///
/// # Returns
/// The hex-encoded SHA-256 digest.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a token against a stored digest.
pub fn verify_token_hash(token: &str, hash: &str) -> bool {
    constant_time_compare(&hash_token(token), hash)
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_length_and_charset() {
        let id = generate_id();
        assert_eq!(id.len(), 22);
        for c in id.chars() {
            assert!(
                c.is_ascii_alphanumeric() || c == '-' || c == '_',
                "id contains invalid base64url character: {}",
                c
            );
        }
    }

    #[test]
    fn test_generate_credential_length_and_charset() {
        let cred = generate_credential();
        assert_eq!(cred.len(), 43);
        for c in cred.chars() {
            assert!(c.is_ascii_alphanumeric() || c == '-' || c == '_');
        }
    }

    #[test]
    fn test_generated_values_unique() {
        assert_ne!(generate_id(), generate_id());
        assert_ne!(generate_credential(), generate_credential());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let token = "some_token_value";
        assert_eq!(hash_token(token), hash_token(token));
    }

    #[test]
    fn test_hash_token_hex_sha256() {
        let hash = hash_token("abc");
        // SHA-256 of "abc", a well-known vector
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_verify_token_hash() {
        let token = generate_credential();
        let hash = hash_token(&token);
        assert!(verify_token_hash(&token, &hash));
        assert!(!verify_token_hash("wrong", &hash));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
