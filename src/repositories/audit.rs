use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AuditAction, AuditEvent, LoginAttempt};

/// Filters accepted by the audit listing.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Repository for the append-only audit trail
#[derive(Clone)]
pub struct AuditEventRepository {
    pool: MySqlPool,
}

impl AuditEventRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        action: AuditAction,
        actor_id: Option<Uuid>,
        resource: &str,
        resource_id: Option<&str>,
        success: bool,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events
            (id, action, actor_id, resource, resource_id, success, ip_address, user_agent, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(action.as_str())
        .bind(actor_id.map(|id| id.to_string()))
        .bind(resource)
        .bind(resource_id)
        .bind(success)
        .bind(ip_address)
        .bind(user_agent)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        filter: &AuditFilter,
    ) -> Result<(Vec<AuditEvent>, i64), StoreError> {
        let actor = filter.actor_id.map(|id| id.to_string());

        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT id, occurred_at, action, actor_id, resource, resource_id,
                   success, ip_address, user_agent, metadata
            FROM audit_events
            WHERE (? IS NULL OR actor_id = ?)
              AND (? IS NULL OR action = ?)
              AND (? IS NULL OR occurred_at >= ?)
            ORDER BY occurred_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&actor)
        .bind(&actor)
        .bind(&filter.action)
        .bind(&filter.action)
        .bind(filter.since)
        .bind(filter.since)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM audit_events
            WHERE (? IS NULL OR actor_id = ?)
              AND (? IS NULL OR action = ?)
              AND (? IS NULL OR occurred_at >= ?)
            "#,
        )
        .bind(&actor)
        .bind(&actor)
        .bind(&filter.action)
        .bind(&filter.action)
        .bind(filter.since)
        .bind(filter.since)
        .fetch_one(&self.pool)
        .await?;

        Ok((events, total))
    }
}

/// Repository for login attempts
#[derive(Clone)]
pub struct LoginAttemptRepository {
    pool: MySqlPool,
}

impl LoginAttemptRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        user_id: Option<Uuid>,
        success: bool,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, username, user_id, success, ip_address, user_agent)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(username)
        .bind(user_id.map(|id| id.to_string()))
        .bind(success)
        .bind(ip_address)
        .bind(user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LoginAttempt>, i64), StoreError> {
        let attempts = sqlx::query_as::<_, LoginAttempt>(
            r#"
            SELECT id, username, user_id, success, ip_address, user_agent, created_at
            FROM login_attempts
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM login_attempts WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok((attempts, total))
    }
}
