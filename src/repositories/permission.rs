use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Permission, PermissionType};

/// Repository for permission records
#[derive(Clone)]
pub struct PermissionRepository {
    pool: MySqlPool,
}

impl PermissionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        permission_type: PermissionType,
        http_method: Option<&str>,
        endpoint: Option<&str>,
        menu_id: Option<&str>,
    ) -> Result<Permission, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, permission_type, http_method, endpoint, menu_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(permission_type.as_str())
        .bind(http_method)
        .bind(endpoint)
        .bind(menu_id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Permission>, StoreError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, name, permission_type, http_method, endpoint, menu_id,
                   is_active, created_at
            FROM permissions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(permission)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, name, permission_type, http_method, endpoint, menu_id,
                   is_active, created_at
            FROM permissions
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(permission)
    }

    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Permission>, i64), StoreError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, name, permission_type, http_method, endpoint, menu_id,
                   is_active, created_at
            FROM permissions
            ORDER BY name
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM permissions")
            .fetch_one(&self.pool)
            .await?;

        Ok((permissions, total))
    }

    /// `name` and `permission_type` are immutable; only the details and
    /// activity flag may change.
    pub async fn update(
        &self,
        id: Uuid,
        http_method: Option<&str>,
        endpoint: Option<&str>,
        menu_id: Option<&str>,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET http_method = ?, endpoint = ?, menu_id = ?, is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(http_method)
        .bind(endpoint)
        .bind(menu_id)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The effective permission set of a user: the union over the user's
    /// active, unexpired role assignments of the active permissions those
    /// roles carry, deduplicated by permission id.
    pub async fn find_effective_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT DISTINCT p.id, p.name, p.permission_type, p.http_method,
                   p.endpoint, p.menu_id, p.is_active, p.created_at
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            INNER JOIN roles r ON r.id = rp.role_id
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
              AND p.is_active = TRUE
              AND r.is_active = TRUE
              AND (ur.expires_at IS NULL OR ur.expires_at > NOW())
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }
}
