use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Permission;

/// Repository for the role ↔ permission join
#[derive(Clone)]
pub struct RolePermissionRepository {
    pool: MySqlPool,
}

impl RolePermissionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Idempotent assignment.
    pub async fn assign(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO role_permissions (role_id, permission_id)
            VALUES (?, ?)
            "#,
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, role_id: Uuid, permission_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_permissions
            WHERE role_id = ? AND permission_id = ?
            "#,
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.name, p.permission_type, p.http_method, p.endpoint,
                   p.menu_id, p.is_active, p.created_at
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?
            ORDER BY p.name
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }
}
