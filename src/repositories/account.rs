//! Repositories backing the password and account engine: password
//! history, reset requests and email-verification requests.

use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{EmailVerificationRequest, PasswordHistoryEntry, PasswordResetRequest};

/// Repository for retired password hashes
#[derive(Clone)]
pub struct PasswordHistoryRepository {
    pool: MySqlPool,
}

impl PasswordHistoryRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Append a hash and trim the user's history to `keep` entries.
    pub async fn push(&self, user_id: Uuid, password_hash: &str, keep: usize) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO password_history (id, user_id, password_hash)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = ?
              AND id NOT IN (
                SELECT id FROM (
                    SELECT id FROM password_history
                    WHERE user_id = ?
                    ORDER BY created_at DESC
                    LIMIT ?
                ) AS recent
              )
            "#,
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The most recent `limit` entries, newest first.
    pub async fn recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PasswordHistoryEntry>, StoreError> {
        let entries = sqlx::query_as::<_, PasswordHistoryEntry>(
            r#"
            SELECT id, user_id, password_hash, created_at
            FROM password_history
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

/// Repository for password-reset requests
#[derive(Clone)]
pub struct PasswordResetRepository {
    pool: MySqlPool,
}

impl PasswordResetRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Store a new reset request and invalidate the user's earlier
    /// unused ones, atomically.
    pub async fn create(
        &self,
        token_hash: &str,
        user_id: Uuid,
        ttl_secs: i64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE password_reset_requests
            SET is_used = TRUE
            WHERE user_id = ? AND is_used = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO password_reset_requests (id, token_hash, user_id, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(Utc::now() + Duration::seconds(ttl_secs))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Atomically consume a reset request: mark it used iff it is still
    /// redeemable, then return it.
    pub async fn consume(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE password_reset_requests
            SET is_used = TRUE
            WHERE token_hash = ? AND is_used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let request = sqlx::query_as::<_, PasswordResetRequest>(
            r#"
            SELECT id, token_hash, user_id, expires_at, is_used, created_at
            FROM password_reset_requests
            WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(request)
    }

    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM password_reset_requests WHERE expires_at < NOW()")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

/// Repository for email-verification requests
#[derive(Clone)]
pub struct EmailVerificationRepository {
    pool: MySqlPool,
}

impl EmailVerificationRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        token_hash: &str,
        user_id: Uuid,
        email: &str,
        ttl_secs: i64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE email_verification_requests
            SET is_used = TRUE
            WHERE user_id = ? AND is_used = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO email_verification_requests (id, token_hash, user_id, email, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(email)
        .bind(Utc::now() + Duration::seconds(ttl_secs))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Atomically consume a verification request.
    pub async fn consume(
        &self,
        token_hash: &str,
    ) -> Result<Option<EmailVerificationRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE email_verification_requests
            SET is_used = TRUE
            WHERE token_hash = ? AND is_used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let request = sqlx::query_as::<_, EmailVerificationRequest>(
            r#"
            SELECT id, token_hash, user_id, email, expires_at, is_used, created_at
            FROM email_verification_requests
            WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(request)
    }

    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM email_verification_requests WHERE expires_at < NOW()")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
