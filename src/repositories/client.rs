use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Client, ClientType, TokenEndpointAuthMethod};

/// Everything needed to register a client; the secret hash is `None`
/// for public clients.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub allow_refresh_tokens: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
    pub authorization_code_ttl_secs: Option<i64>,
}

/// Repository for OAuth client records
#[derive(Clone)]
pub struct ClientRepository {
    pool: MySqlPool,
}

impl ClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const COLUMNS: &'static str = r#"id, client_id, client_secret_hash, name, client_type,
        redirect_uris, allowed_scopes, grant_types, response_types,
        token_endpoint_auth_method, require_pkce, require_consent,
        allow_refresh_tokens, access_token_ttl_secs, refresh_token_ttl_secs,
        authorization_code_ttl_secs, is_active, created_at"#;

    pub async fn create(&self, new_client: NewClient) -> Result<Client, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO clients
            (id, client_id, client_secret_hash, name, client_type, redirect_uris,
             allowed_scopes, grant_types, response_types, token_endpoint_auth_method,
             require_pkce, require_consent, allow_refresh_tokens,
             access_token_ttl_secs, refresh_token_ttl_secs, authorization_code_ttl_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_client.client_id)
        .bind(&new_client.client_secret_hash)
        .bind(&new_client.name)
        .bind(new_client.client_type.as_str())
        .bind(serde_json::to_value(&new_client.redirect_uris).unwrap_or_default())
        .bind(serde_json::to_value(&new_client.allowed_scopes).unwrap_or_default())
        .bind(serde_json::to_value(&new_client.grant_types).unwrap_or_default())
        .bind(serde_json::to_value(&new_client.response_types).unwrap_or_default())
        .bind(new_client.token_endpoint_auth_method.as_str())
        .bind(new_client.require_pkce)
        .bind(new_client.require_consent)
        .bind(new_client.allow_refresh_tokens)
        .bind(new_client.access_token_ttl_secs)
        .bind(new_client.refresh_token_ttl_secs)
        .bind(new_client.authorization_code_ttl_secs)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, StoreError> {
        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE id = ?",
            Self::COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE client_id = ?",
            Self::COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    pub async fn find_active_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Client>, StoreError> {
        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE client_id = ? AND is_active = TRUE",
            Self::COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Client>, i64), StoreError> {
        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients ORDER BY created_at DESC LIMIT ? OFFSET ?",
            Self::COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await?;

        Ok((clients, total))
    }

    /// Update the mutable client policy fields.
    pub async fn update_policy(
        &self,
        id: Uuid,
        name: &str,
        redirect_uris: &[String],
        allowed_scopes: &[String],
        grant_types: &[String],
        require_consent: bool,
        allow_refresh_tokens: bool,
        access_token_ttl_secs: Option<i64>,
        refresh_token_ttl_secs: Option<i64>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET name = ?, redirect_uris = ?, allowed_scopes = ?, grant_types = ?,
                require_consent = ?, allow_refresh_tokens = ?,
                access_token_ttl_secs = ?, refresh_token_ttl_secs = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(serde_json::to_value(redirect_uris).unwrap_or_default())
        .bind(serde_json::to_value(allowed_scopes).unwrap_or_default())
        .bind(serde_json::to_value(grant_types).unwrap_or_default())
        .bind(require_consent)
        .bind(allow_refresh_tokens)
        .bind(access_token_ttl_secs)
        .bind(refresh_token_ttl_secs)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE clients SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_secret_hash(&self, id: Uuid, secret_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE clients SET client_secret_hash = ? WHERE id = ?")
            .bind(secret_hash)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Count live tokens issued under a client; deletion is refused while
    /// this is non-zero.
    pub async fn count_outstanding_tokens(&self, id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM access_tokens
                 WHERE client_id = ? AND expires_at > NOW())
              + (SELECT COUNT(*) FROM refresh_tokens
                 WHERE client_id = ? AND is_revoked = FALSE AND expires_at > NOW())
            "#,
        )
        .bind(id.to_string())
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
