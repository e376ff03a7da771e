//! PKCE (Proof Key for Code Exchange) verification per RFC 7636.
//!
//! Only the `S256` transform is supported; `plain` is not an accepted
//! method, so an intercepted challenge never equals its verifier.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::utils::token::constant_time_compare;

/// Minimum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;

/// Maximum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// The only supported code challenge method.
pub const PKCE_METHOD_S256: &str = "S256";

/// Verify a code_verifier against a stored code_challenge.
///
/// # Arguments
/// * `code_verifier` - The verifier presented at the token endpoint
/// * `code_challenge` - The challenge bound to the authorization code
///
/// # Returns
/// `true` iff `BASE64URL(SHA256(code_verifier)) == code_challenge`.
pub fn verify_pkce(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = compute_s256_challenge(code_verifier);
    // Constant-time comparison to prevent timing attacks
    constant_time_compare(&computed, code_challenge)
}

/// Compute the S256 code_challenge for a verifier.
///
/// S256: code_challenge = BASE64URL(SHA256(code_verifier))
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate code_verifier format according to RFC 7636.
///
/// The verifier must be 43..=128 characters from the unreserved URI set:
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }

    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

/// Validate code_challenge format.
///
/// An S256 challenge is the base64url encoding of a 32-byte digest, which
/// is exactly 43 characters.
pub fn validate_code_challenge(challenge: &str) -> bool {
    if challenge.len() != 43 {
        return false;
    }

    challenge
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known test vector from RFC 7636 Appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_verify_pkce_valid() {
        assert!(verify_pkce(VERIFIER, CHALLENGE));
    }

    #[test]
    fn test_verify_pkce_wrong_verifier() {
        let verifier = "wrong_verifier_that_is_long_enough_to_pass_length_check";
        assert!(!verify_pkce(verifier, CHALLENGE));
    }

    #[test]
    fn test_plain_style_challenge_never_matches() {
        // A challenge equal to the verifier (the old `plain` transform)
        // must not verify under S256.
        let verifier = "my_plain_code_verifier_that_is_at_least_43_chars";
        assert!(!verify_pkce(verifier, verifier));
    }

    #[test]
    fn test_compute_s256_challenge() {
        assert_eq!(compute_s256_challenge(VERIFIER), CHALLENGE);
    }

    #[test]
    fn test_validate_code_verifier_bounds() {
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn test_validate_code_verifier_charset() {
        assert!(validate_code_verifier(
            "abcABC123-._~abcABC123-._~abcABC123-._~abcde"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789 abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789+abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789=abcdef"
        ));
    }

    #[test]
    fn test_validate_code_challenge() {
        assert!(validate_code_challenge(CHALLENGE));
        assert!(!validate_code_challenge(&CHALLENGE[..42]));
        let long = format!("{}x", CHALLENGE);
        assert!(!validate_code_challenge(&long));
        let plus = CHALLENGE.replace('-', "+");
        assert!(!validate_code_challenge(&plus));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_valid_verifier_matches_its_own_challenge(
                verifier in "[A-Za-z0-9._~-]{43,128}"
            ) {
                prop_assert!(validate_code_verifier(&verifier));
                let challenge = compute_s256_challenge(&verifier);
                prop_assert!(validate_code_challenge(&challenge));
                prop_assert!(verify_pkce(&verifier, &challenge));
            }

            #[test]
            fn distinct_verifiers_never_cross_match(
                a in "[A-Za-z0-9]{43}",
                b in "[A-Za-z0-9]{43}"
            ) {
                prop_assume!(a != b);
                prop_assert!(!verify_pkce(&b, &compute_s256_challenge(&a)));
            }
        }
    }
}
