use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ConsentGrant;

/// Repository for consent grants
#[derive(Clone)]
pub struct ConsentRepository {
    pool: MySqlPool,
}

impl ConsentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Record or widen a user's consent for a client. The scope column
    /// always holds the space-joined union computed by the caller.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scope: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO consent_grants (id, user_id, client_id, scope)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE scope = VALUES(scope), issued_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(scope)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<ConsentGrant>, StoreError> {
        let grant = sqlx::query_as::<_, ConsentGrant>(
            r#"
            SELECT id, user_id, client_id, scope, issued_at, expires_at
            FROM consent_grants
            WHERE user_id = ? AND client_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ConsentGrant>, StoreError> {
        let grants = sqlx::query_as::<_, ConsentGrant>(
            r#"
            SELECT id, user_id, client_id, scope, issued_at, expires_at
            FROM consent_grants
            WHERE user_id = ?
            ORDER BY issued_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    pub async fn delete(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM consent_grants
            WHERE user_id = ? AND client_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
