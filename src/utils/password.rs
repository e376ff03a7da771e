//! Password and client-secret hashing, plus the configurable password
//! policy applied at registration, change and reset.

use crate::error::ApiError;

/// Bcrypt cost factor for password and secret hashes.
pub const BCRYPT_COST: u32 = 12;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password (or client secret) using bcrypt.
///
/// # Arguments
/// * `password` - The plain text value to hash
///
/// # Returns
/// * `Ok(String)` - The bcrypt hash
/// * `Err(ApiError)` - If hashing fails
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| ApiError::InternalError(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored bcrypt hash.
///
/// # Returns
/// * `Ok(true)` - If the password matches
/// * `Ok(false)` - If the password does not match
/// * `Err(ApiError)` - If the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::InternalError(anyhow::anyhow!("Password verification failed: {}", e)))
}

/// Complexity requirements for new passwords.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    /// Check a candidate password against the policy.
    ///
    /// # Returns
    /// * `Ok(())` - The password satisfies every enabled requirement
    /// * `Err(ApiError::Validation)` - Naming the first unmet requirement
    pub fn validate(&self, password: &str) -> Result<(), ApiError> {
        if password.len() < self.min_length.max(MIN_PASSWORD_LENGTH) {
            return Err(ApiError::Validation(format!(
                "Password must be at least {} characters",
                self.min_length.max(MIN_PASSWORD_LENGTH)
            )));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ApiError::Validation(
                "Password must contain an uppercase letter".to_string(),
            ));
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(ApiError::Validation(
                "Password must contain a lowercase letter".to_string(),
            ));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(ApiError::Validation(
                "Password must contain a digit".to_string(),
            ));
        }
        if self.require_special && password.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::Validation(
                "Password must contain a special character".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_produces_bcrypt_hash() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$2"), "expected bcrypt format: {}", hash);
    }

    #[test]
    fn test_verify_password_roundtrip() {
        let password = "S3cure-enough";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("not the password", &hash).unwrap());
    }

    #[test]
    fn test_hash_password_salted() {
        let password = "same_password1A";
        let hash1 = hash_password(password).unwrap();
        let hash2 = hash_password(password).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password(password, &hash1).unwrap());
        assert!(verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_policy_min_length() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("Ab1xyzq").is_err()); // 7 chars
        assert!(policy.validate("Ab1xyzqw").is_ok());
    }

    #[test]
    fn test_policy_floor_is_eight() {
        // A policy configured below the floor still requires 8 characters.
        let policy = PasswordPolicy {
            min_length: 4,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        };
        assert!(policy.validate("abcd").is_err());
        assert!(policy.validate("abcdefgh").is_ok());
    }

    #[test]
    fn test_policy_complexity_classes() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        };
        assert!(policy.validate("alllowercase1!").is_err());
        assert!(policy.validate("ALLUPPERCASE1!").is_err());
        assert!(policy.validate("NoDigitsHere!").is_err());
        assert!(policy.validate("NoSpecial123").is_err());
        assert!(policy.validate("Valid-Pass123").is_ok());
    }
}
