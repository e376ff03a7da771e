//! Password and account lifecycle engine: credential verification with
//! lockout, password history, and the password-reset and
//! email-verification token flows.
//!
//! Every password-related failure surfaces the same neutral message so
//! callers cannot probe which usernames exist.

use chrono::{Duration, Utc};
use regex::Regex;
use sqlx::MySqlPool;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::User;
use crate::repositories::{
    EmailVerificationRepository, LoginAttemptRepository, PasswordHistoryRepository,
    PasswordResetRepository, UserRepository,
};
use crate::utils::password::{hash_password, verify_password, PasswordPolicy};
use crate::utils::token::{generate_credential, hash_token};

/// Failure counters reset after this long without a failed attempt.
const FAILURE_RESET_WINDOW_MINUTES: i64 = 30;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

/// Basic shape check; deliverability is the mailer's problem.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Tunables for the account engine, derived from configuration.
#[derive(Debug, Clone)]
pub struct AccountPolicy {
    pub password_policy: PasswordPolicy,
    pub history_depth: usize,
    pub max_failed_logins: i32,
    pub lockout_minutes: i64,
    pub reset_token_ttl_secs: i64,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            password_policy: PasswordPolicy::default(),
            history_depth: 5,
            max_failed_logins: 5,
            lockout_minutes: 15,
            reset_token_ttl_secs: 3600,
        }
    }
}

/// Service for the password and account engine
#[derive(Clone)]
pub struct AccountService {
    users: UserRepository,
    history: PasswordHistoryRepository,
    resets: PasswordResetRepository,
    verifications: EmailVerificationRepository,
    attempts: LoginAttemptRepository,
    policy: AccountPolicy,
}

impl AccountService {
    pub fn new(pool: MySqlPool, policy: AccountPolicy) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            history: PasswordHistoryRepository::new(pool.clone()),
            resets: PasswordResetRepository::new(pool.clone()),
            verifications: EmailVerificationRepository::new(pool.clone()),
            attempts: LoginAttemptRepository::new(pool),
            policy,
        }
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    /// Register a new user.
    ///
    /// # Returns
    /// The created user and, when an email was given, the raw
    /// email-verification token to be delivered out of band.
    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
        must_change_password: bool,
    ) -> Result<(User, Option<String>), ApiError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ApiError::Validation("username is required".to_string()));
        }

        if let Some(email) = email {
            if !is_valid_email(email) {
                return Err(ApiError::Validation("Invalid email address".to_string()));
            }
            if self.users.find_by_email(email).await?.is_some() {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
        }

        if self.users.find_by_username(username).await?.is_some() {
            return Err(ApiError::Conflict("Username already taken".to_string()));
        }

        self.policy.password_policy.validate(password)?;

        let password_hash = hash_password(password)?;
        let user = self
            .users
            .create(username, email, &password_hash, None, must_change_password)
            .await?;

        // The current hash participates in the reuse check.
        self.history
            .push(user.id, &password_hash, self.policy.history_depth + 1)
            .await?;

        let verification = match &user.email {
            Some(email) => Some(self.issue_email_verification(&user, email).await?),
            None => None,
        };

        Ok((user, verification))
    }

    /// Verify a username/password pair, enforcing lockout.
    ///
    /// Failures are indistinguishable to the caller: unknown user, wrong
    /// password, inactive and locked accounts all produce the same
    /// neutral error.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<User, ApiError> {
        let user = self.users.find_by_username(username).await?;

        let Some(user) = user else {
            self.attempts
                .create(username, None, false, ip_address, user_agent)
                .await?;
            return Err(ApiError::InvalidCredentials);
        };

        if !user.can_authenticate() {
            self.attempts
                .create(username, Some(user.id), false, ip_address, user_agent)
                .await?;
            return Err(ApiError::InvalidCredentials);
        }

        if !verify_password(password, &user.password_hash)? {
            self.record_failure(&user).await?;
            self.attempts
                .create(username, Some(user.id), false, ip_address, user_agent)
                .await?;
            return Err(ApiError::InvalidCredentials);
        }

        self.users.record_successful_login(user.id).await?;
        self.attempts
            .create(username, Some(user.id), true, ip_address, user_agent)
            .await?;

        // Re-read to pick up the cleared counters.
        Ok(self.users.find_by_id(user.id).await?.unwrap_or(user))
    }

    /// Count a failed attempt, locking the account once the threshold is
    /// reached. The counter restarts when the last failure is older than
    /// the rolling window.
    async fn record_failure(&self, user: &User) -> Result<(), ApiError> {
        let stale = user
            .last_failed_login
            .map(|t| t < Utc::now() - Duration::minutes(FAILURE_RESET_WINDOW_MINUTES))
            .unwrap_or(false);
        if stale {
            self.users.unlock(user.id).await?;
        }

        let attempts = self.users.record_failed_login(user.id).await?;
        if attempts >= self.policy.max_failed_logins {
            let until = Utc::now() + Duration::minutes(self.policy.lockout_minutes);
            self.users.lock_until(user.id, until).await?;
        }

        Ok(())
    }

    /// Change a password given the current one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::NotFound("user"))?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(ApiError::InvalidCredentials);
        }

        self.set_password(&user, new_password).await
    }

    /// Apply the policy and the reuse check, then store the new hash.
    async fn set_password(&self, user: &User, new_password: &str) -> Result<(), ApiError> {
        self.policy.password_policy.validate(new_password)?;

        // The reuse check covers the current password and the retained
        // history.
        if verify_password(new_password, &user.password_hash)? {
            return Err(ApiError::Validation(
                "Password was used recently".to_string(),
            ));
        }
        for entry in self
            .history
            .recent(user.id, self.policy.history_depth)
            .await?
        {
            if verify_password(new_password, &entry.password_hash)? {
                return Err(ApiError::Validation(
                    "Password was used recently".to_string(),
                ));
            }
        }

        let new_hash = hash_password(new_password)?;
        self.users.set_password_hash(user.id, &new_hash, false).await?;
        self.history
            .push(user.id, &new_hash, self.policy.history_depth + 1)
            .await?;

        Ok(())
    }

    /// Begin a password reset. The response is identical whether or not
    /// the email resolves to an account; when it does, a single-use
    /// token replaces any earlier unused ones.
    ///
    /// # Returns
    /// The raw reset token for out-of-band delivery, or `None` when the
    /// email matched no active user.
    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, ApiError> {
        let Some(user) = self.users.find_by_email(email).await?.filter(|u| u.is_active) else {
            return Ok(None);
        };

        let token = generate_credential();
        self.resets
            .create(&hash_token(&token), user.id, self.policy.reset_token_ttl_secs)
            .await?;

        Ok(Some(token))
    }

    /// Complete a password reset with a token from `forgot_password`.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, ApiError> {
        let request = self
            .resets
            .consume(&hash_token(token))
            .await?
            .ok_or(ApiError::Validation("Invalid or expired token".to_string()))?;

        let user = self
            .users
            .find_by_id(request.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::Validation("Invalid or expired token".to_string()))?;

        self.set_password(&user, new_password).await?;
        // A completed reset also clears any lockout.
        self.users.unlock(user.id).await?;

        Ok(user)
    }

    /// Issue an email-verification token for the given address.
    pub async fn issue_email_verification(
        &self,
        user: &User,
        email: &str,
    ) -> Result<String, ApiError> {
        let token = generate_credential();
        self.verifications
            .create(
                &hash_token(&token),
                user.id,
                email,
                self.policy.reset_token_ttl_secs,
            )
            .await?;

        Ok(token)
    }

    /// Confirm an email address. The token is consumed atomically and
    /// only counts when it was issued for the user's current email,
    /// compared case-insensitively.
    pub async fn confirm_email(&self, token: &str) -> Result<User, ApiError> {
        let request = self
            .verifications
            .consume(&hash_token(token))
            .await?
            .ok_or(ApiError::Validation("Invalid or expired token".to_string()))?;

        let user = self
            .users
            .find_by_id(request.user_id)
            .await?
            .ok_or(ApiError::Validation("Invalid or expired token".to_string()))?;

        let matches = user
            .email
            .as_deref()
            .map(|email| request.matches_email(email))
            .unwrap_or(false);
        if !matches {
            return Err(ApiError::Validation("Invalid or expired token".to_string()));
        }

        self.users.set_email_verified(user.id).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("al ice@example.com"));
    }

    #[test]
    fn test_default_policy_matches_requirements() {
        let policy = AccountPolicy::default();
        assert!(policy.history_depth >= 5);
        assert_eq!(policy.max_failed_logins, 5);
        assert_eq!(policy.lockout_minutes, 15);
        assert!(policy.reset_token_ttl_secs <= 3600);
    }
}
