use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::AuthorizationCode;

/// Repository for authorization codes. Codes are stored by digest and
/// consumed at most once.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code_hash: &str,
        user_id: Uuid,
        client_id: Uuid,
        redirect_uri: &str,
        scope: &str,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
        nonce: Option<&str>,
        ttl_secs: i64,
    ) -> Result<AuthorizationCode, StoreError> {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(ttl_secs);

        sqlx::query(
            r#"
            INSERT INTO authorization_codes
            (id, code_hash, user_id, client_id, redirect_uri, scope,
             code_challenge, code_challenge_method, nonce, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(code_hash)
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(redirect_uri)
        .bind(scope)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(nonce)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorizationCode>, StoreError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, code_hash, user_id, client_id, redirect_uri, scope,
                   code_challenge, code_challenge_method, nonce, expires_at,
                   consumed_at, created_at
            FROM authorization_codes
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Atomically consume a code: mark it consumed iff it is still
    /// unconsumed and unexpired, then return it. The guarded UPDATE runs
    /// inside a transaction with the read, so of two concurrent
    /// redemptions exactly one observes `rows_affected == 1`.
    pub async fn consume(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE authorization_codes
            SET consumed_at = NOW()
            WHERE code_hash = ? AND consumed_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(code_hash)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, code_hash, user_id, client_id, redirect_uri, scope,
                   code_challenge, code_challenge_method, nonce, expires_at,
                   consumed_at, created_at
            FROM authorization_codes
            WHERE code_hash = ?
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(code)
    }

    /// Purge expired codes.
    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
