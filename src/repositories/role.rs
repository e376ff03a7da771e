use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Role;

/// Repository for role records
#[derive(Clone)]
pub struct RoleRepository {
    pool: MySqlPool,
}

impl RoleRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, display_name: &str) -> Result<Role, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, display_name)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(display_name)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, display_name, is_active, created_at
            FROM roles
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, display_name, is_active, created_at
            FROM roles
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Role>, i64), StoreError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, display_name, is_active, created_at
            FROM roles
            ORDER BY name
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;

        Ok((roles, total))
    }

    pub async fn update(
        &self,
        id: Uuid,
        display_name: &str,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET display_name = ?, is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
