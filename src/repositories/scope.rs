use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Scope;

/// Repository for scope definitions
#[derive(Clone)]
pub struct ScopeRepository {
    pool: MySqlPool,
}

impl ScopeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        is_public: bool,
    ) -> Result<Scope, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO scopes (id, name, description, is_public)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(description)
        .bind(is_public)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Scope>, StoreError> {
        let scope = sqlx::query_as::<_, Scope>(
            r#"
            SELECT id, name, description, is_public, is_active, created_at
            FROM scopes
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(scope)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Scope>, StoreError> {
        let scope = sqlx::query_as::<_, Scope>(
            r#"
            SELECT id, name, description, is_public, is_active, created_at
            FROM scopes
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(scope)
    }

    /// How many of the given names exist as active scopes. All requested
    /// scopes are valid iff the count equals the request length.
    pub async fn count_active_by_names(&self, names: &[String]) -> Result<i64, StoreError> {
        if names.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let query = format!(
            "SELECT COUNT(*) FROM scopes WHERE is_active = TRUE AND name IN ({})",
            placeholders
        );

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        for name in names {
            q = q.bind(name);
        }

        Ok(q.fetch_one(&self.pool).await?)
    }

    /// Names of all active public scopes, for discovery metadata.
    pub async fn list_public_names(&self) -> Result<Vec<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM scopes WHERE is_active = TRUE AND is_public = TRUE ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Scope>, i64), StoreError> {
        let scopes = sqlx::query_as::<_, Scope>(
            r#"
            SELECT id, name, description, is_public, is_active, created_at
            FROM scopes
            ORDER BY name
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scopes")
            .fetch_one(&self.pool)
            .await?;

        Ok((scopes, total))
    }

    pub async fn update(
        &self,
        id: Uuid,
        description: Option<&str>,
        is_public: bool,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scopes
            SET description = ?, is_public = ?, is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(description)
        .bind(is_public)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
