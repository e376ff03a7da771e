//! Repositories for issued-token records and the jti blacklist.
//!
//! Refresh rotation and cascaded revocation run inside a single
//! transaction so concurrent duplicates observe "already revoked".

use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Transaction};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AccessTokenRecord, RefreshTokenRecord, TokenKind};

/// Repository for access-token records
#[derive(Clone)]
pub struct AccessTokenRepository {
    pool: MySqlPool,
}

impl AccessTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        jti: &str,
        token_hash: &str,
        user_id: Option<Uuid>,
        client_id: Uuid,
        scope: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (jti, token_hash, user_id, client_id, scope, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(jti)
        .bind(token_hash)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id.to_string())
        .bind(scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_jti(&self, jti: &str) -> Result<Option<AccessTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT jti, token_hash, user_id, client_id, scope, expires_at, created_at
            FROM access_tokens
            WHERE jti = ?
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT jti, token_hash, user_id, client_id, scope, expires_at, created_at
            FROM access_tokens
            WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Repository for refresh-token records, including the transactional
/// rotation and cascade operations.
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: MySqlPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        jti: &str,
        token_hash: &str,
        user_id: Option<Uuid>,
        client_id: Uuid,
        scope: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, token_hash, user_id, client_id, scope, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(jti)
        .bind(token_hash)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id.to_string())
        .bind(scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT jti, token_hash, user_id, client_id, scope, expires_at,
                   is_revoked, revoked_at, previous_token_id, created_at
            FROM refresh_tokens
            WHERE jti = ?
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT jti, token_hash, user_id, client_id, scope, expires_at,
                   is_revoked, revoked_at, previous_token_id, created_at
            FROM refresh_tokens
            WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Rotate a refresh token in one transaction: revoke the old record
    /// iff it is still live, insert the replacement linked to it, and
    /// blacklist the old jti for its remaining lifetime.
    ///
    /// Returns `false` without inserting when the old token was already
    /// revoked, so a concurrent duplicate rotation loses cleanly.
    #[allow(clippy::too_many_arguments)]
    pub async fn rotate(
        &self,
        old_jti: &str,
        old_expires_at: DateTime<Utc>,
        new_jti: &str,
        new_token_hash: &str,
        user_id: Option<Uuid>,
        client_id: Uuid,
        scope: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE jti = ? AND is_revoked = FALSE
            "#,
        )
        .bind(old_jti)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
            (jti, token_hash, user_id, client_id, scope, expires_at, previous_token_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_jti)
        .bind(new_token_hash)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id.to_string())
        .bind(scope)
        .bind(new_expires_at)
        .bind(old_jti)
        .execute(&mut *tx)
        .await?;

        blacklist_in_tx(&mut tx, old_jti, TokenKind::Refresh, old_expires_at).await?;

        tx.commit().await?;

        Ok(true)
    }

    /// Revoke a refresh token and everything issued alongside it: the
    /// token record is marked revoked, its jti is blacklisted, and every
    /// live access token for the same (user, client) is blacklisted in
    /// bulk. One transaction, no per-token queries.
    pub async fn revoke_with_cascade(
        &self,
        record: &RefreshTokenRecord,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE jti = ? AND is_revoked = FALSE
            "#,
        )
        .bind(&record.jti)
        .execute(&mut *tx)
        .await?;

        blacklist_in_tx(&mut tx, &record.jti, TokenKind::Refresh, record.expires_at).await?;

        // Candidate access tokens in one pass, blacklisted by insert-select.
        let cascaded = sqlx::query(
            r#"
            INSERT IGNORE INTO token_blacklist (jti, token_type, expires_at)
            SELECT jti, 'access', expires_at
            FROM access_tokens
            WHERE client_id = ?
              AND (user_id <=> ?)
              AND expires_at > NOW()
            "#,
        )
        .bind(record.client_id.to_string())
        .bind(record.user_id.map(|u| u.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(cascaded.rows_affected())
    }

    /// Revoke every live refresh token of a (user, client) pair, each
    /// with the full cascade. Used on consent revocation and replay
    /// detection.
    pub async fn revoke_all_for_user_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<u64, StoreError> {
        let live = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT jti, token_hash, user_id, client_id, scope, expires_at,
                   is_revoked, revoked_at, previous_token_id, created_at
            FROM refresh_tokens
            WHERE user_id = ? AND client_id = ? AND is_revoked = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut revoked = 0;
        for record in &live {
            self.revoke_with_cascade(record).await?;
            revoked += 1;
        }

        Ok(revoked)
    }

    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Repository for the jti deny-list
#[derive(Clone)]
pub struct BlacklistRepository {
    pool: MySqlPool,
}

impl BlacklistRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Idempotent insert; the entry expires with the token it denies.
    pub async fn add(
        &self,
        jti: &str,
        kind: TokenKind,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO token_blacklist (jti, token_type, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(jti)
        .bind(kind.as_str())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn contains(&self, jti: &str) -> Result<bool, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM token_blacklist WHERE jti = ?")
                .bind(jti)
                .fetch_one(&self.pool)
                .await?;

        Ok(count > 0)
    }

    /// Purge entries whose token has expired anyway.
    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

async fn blacklist_in_tx(
    tx: &mut Transaction<'_, MySql>,
    jti: &str,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT IGNORE INTO token_blacklist (jti, token_type, expires_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(jti)
    .bind(kind.as_str())
    .bind(expires_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
