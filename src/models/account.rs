//! Password history and the single-use tokens driving password reset and
//! email verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A retired password hash kept for reuse checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistoryRow {
    pub id: String,
    pub user_id: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<PasswordHistoryRow> for PasswordHistoryEntry {
    fn from(row: PasswordHistoryRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for PasswordHistoryEntry {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(PasswordHistoryEntry::from(PasswordHistoryRow::from_row(
            row,
        )?))
    }
}

/// A pending password reset. Single-use, short-lived, stored by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetRow {
    pub id: String,
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PasswordResetRow> for PasswordResetRequest {
    fn from(row: PasswordResetRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            token_hash: row.token_hash,
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            expires_at: row.expires_at,
            is_used: row.is_used,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for PasswordResetRequest {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(PasswordResetRequest::from(PasswordResetRow::from_row(row)?))
    }
}

impl PasswordResetRequest {
    pub fn is_redeemable(&self) -> bool {
        !self.is_used && self.expires_at > Utc::now()
    }
}

/// A pending email verification. Shaped like a reset request but bound
/// to the email it was sent to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerificationRequest {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EmailVerificationRow {
    pub id: String,
    pub token_hash: String,
    pub user_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl From<EmailVerificationRow> for EmailVerificationRequest {
    fn from(row: EmailVerificationRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            token_hash: row.token_hash,
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            email: row.email,
            expires_at: row.expires_at,
            is_used: row.is_used,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for EmailVerificationRequest {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(EmailVerificationRequest::from(
            EmailVerificationRow::from_row(row)?,
        ))
    }
}

impl EmailVerificationRequest {
    pub fn is_redeemable(&self) -> bool {
        !self.is_used && self.expires_at > Utc::now()
    }

    /// The token only verifies the address it was issued for,
    /// case-insensitively.
    pub fn matches_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reset_request_redeemable() {
        let mut req = PasswordResetRequest {
            id: Uuid::new_v4(),
            token_hash: "h".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::minutes(30),
            is_used: false,
            created_at: Utc::now(),
        };
        assert!(req.is_redeemable());

        req.is_used = true;
        assert!(!req.is_redeemable());

        req.is_used = false;
        req.expires_at = Utc::now() - Duration::minutes(1);
        assert!(!req.is_redeemable());
    }

    #[test]
    fn test_email_match_case_insensitive() {
        let req = EmailVerificationRequest {
            id: Uuid::new_v4(),
            token_hash: "h".to_string(),
            user_id: Uuid::new_v4(),
            email: "Alice@Example.COM".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            is_used: false,
            created_at: Utc::now(),
        };
        assert!(req.matches_email("alice@example.com"));
        assert!(!req.matches_email("bob@example.com"));
    }
}
