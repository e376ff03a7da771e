use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Role, UserRole};

/// Repository for the user ↔ role join
#[derive(Clone)]
pub struct UserRoleRepository {
    pool: MySqlPool,
}

impl UserRoleRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Assign a role; re-assignment refreshes expiry and assigner.
    pub async fn assign(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_by, expires_at)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE assigned_by = VALUES(assigned_by),
                                    expires_at = VALUES(expires_at)
            "#,
        )
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(assigned_by.map(|id| id.to_string()))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_roles
            WHERE user_id = ? AND role_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Active, unexpired roles of a user.
    pub async fn list_active_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.display_name, r.is_active, r.created_at
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
              AND r.is_active = TRUE
              AND (ur.expires_at IS NULL OR ur.expires_at > NOW())
            ORDER BY r.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    /// All assignments of a user including expired ones, for admin views.
    pub async fn list_assignments(&self, user_id: Uuid) -> Result<Vec<UserRole>, StoreError> {
        let assignments = sqlx::query_as::<_, UserRole>(
            r#"
            SELECT user_id, role_id, assigned_by, expires_at, created_at
            FROM user_roles
            WHERE user_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(assignments)
    }

    /// Whether any user still holds the role.
    pub async fn role_in_use(&self, role_id: Uuid) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_roles WHERE role_id = ?",
        )
        .bind(role_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}
