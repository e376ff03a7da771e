use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::User;

/// Filters accepted by the user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username_contains: Option<String>,
    pub is_active: Option<bool>,
}

/// Repository for user records
#[derive(Clone)]
pub struct UserRepository {
    pool: MySqlPool,
}

impl UserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create a new user. Usernames are stored case-folded so uniqueness
    /// is case-insensitive.
    pub async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        display_name: Option<&str>,
        must_change_password: bool,
    ) -> Result<User, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users
            (id, username, email, password_hash, display_name, must_change_password)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(username.to_lowercase())
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .bind(must_change_password)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, display_name, is_active,
                   email_verified, must_change_password, failed_login_attempts,
                   locked_until, last_failed_login, last_login_at, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, display_name, is_active,
                   email_verified, must_change_password, failed_login_attempts,
                   locked_until, last_failed_login, last_login_at, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, display_name, is_active,
                   email_verified, must_change_password, failed_login_attempts,
                   locked_until, last_failed_login, last_login_at, created_at
            FROM users
            WHERE LOWER(email) = LOWER(?)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// List users with paging; returns the page and the total count.
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        filter: &UserFilter,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let pattern = filter
            .username_contains
            .as_ref()
            .map(|s| format!("%{}%", s));

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, display_name, is_active,
                   email_verified, must_change_password, failed_login_attempts,
                   locked_until, last_failed_login, last_login_at, created_at
            FROM users
            WHERE (? IS NULL OR username LIKE ?)
              AND (? IS NULL OR is_active = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(filter.is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users
            WHERE (? IS NULL OR username LIKE ?)
              AND (? IS NULL OR is_active = ?)
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(filter.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok((users, total))
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = ?, display_name = ?
            WHERE id = ?
            "#,
        )
        .bind(email)
        .bind(display_name)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-delete / reinstate.
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        must_change_password: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, must_change_password = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(must_change_password)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Increment the failed-login counter and stamp the failure time.
    pub async fn record_failed_login(&self, id: Uuid) -> Result<i32, StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                last_failed_login = NOW()
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        let attempts = sqlx::query_scalar::<_, i32>(
            "SELECT failed_login_attempts FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Reset the failure counter and record the successful login.
    pub async fn record_successful_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_failed_login = NULL,
                last_login_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn lock_until(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(until)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear the lock and counters (admin action).
    pub async fn unlock(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET locked_until = NULL,
                failed_login_attempts = 0,
                last_failed_login = NULL
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hard delete; dependent records go with the user via FK cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
