use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Whether a client can keep a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientType {
    Public,
    Confidential,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "PUBLIC",
            ClientType::Confidential => "CONFIDENTIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PUBLIC" => Some(ClientType::Public),
            "CONFIDENTIAL" => Some(ClientType::Confidential),
            _ => None,
        }
    }
}

/// How a client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

impl TokenEndpointAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEndpointAuthMethod::ClientSecretBasic => "client_secret_basic",
            TokenEndpointAuthMethod::ClientSecretPost => "client_secret_post",
            TokenEndpointAuthMethod::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client_secret_basic" => Some(TokenEndpointAuthMethod::ClientSecretBasic),
            "client_secret_post" => Some(TokenEndpointAuthMethod::ClientSecretPost),
            "none" => Some(TokenEndpointAuthMethod::None),
            _ => None,
        }
    }
}

/// OAuth client - a registered application
///
/// Public clients carry no secret hash, must use PKCE and authenticate
/// with method `none`. Redirect URIs match by exact string comparison
/// only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing)]
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
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Row type for MySQL query results
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: String,
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub client_type: String,
    pub redirect_uris: serde_json::Value,
    pub allowed_scopes: serde_json::Value,
    pub grant_types: serde_json::Value,
    pub response_types: serde_json::Value,
    pub token_endpoint_auth_method: String,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub allow_refresh_tokens: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
    pub authorization_code_ttl_secs: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: row.client_id,
            client_secret_hash: row.client_secret_hash,
            name: row.name,
            client_type: ClientType::parse(&row.client_type).unwrap_or(ClientType::Confidential),
            redirect_uris: serde_json::from_value(row.redirect_uris).unwrap_or_default(),
            allowed_scopes: serde_json::from_value(row.allowed_scopes).unwrap_or_default(),
            grant_types: serde_json::from_value(row.grant_types).unwrap_or_default(),
            response_types: serde_json::from_value(row.response_types).unwrap_or_default(),
            token_endpoint_auth_method: TokenEndpointAuthMethod::parse(
                &row.token_endpoint_auth_method,
            )
            .unwrap_or(TokenEndpointAuthMethod::ClientSecretBasic),
            require_pkce: row.require_pkce,
            require_consent: row.require_consent,
            allow_refresh_tokens: row.allow_refresh_tokens,
            access_token_ttl_secs: row.access_token_ttl_secs,
            refresh_token_ttl_secs: row.refresh_token_ttl_secs,
            authorization_code_ttl_secs: row.authorization_code_ttl_secs,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Client {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let client_row = ClientRow::from_row(row)?;
        Ok(Client::from(client_row))
    }
}

impl Client {
    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    /// Exact-string match against the registered redirect URIs.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn allows_scope(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn allows_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|r| r == response_type)
    }

    /// PKCE is mandatory for public clients regardless of configuration.
    pub fn pkce_required(&self) -> bool {
        self.require_pkce || self.is_public()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client {
            id: Uuid::new_v4(),
            client_id: "c1".to_string(),
            client_secret_hash: Some("$2b$12$hash".to_string()),
            name: "Test App".to_string(),
            client_type: ClientType::Confidential,
            redirect_uris: vec!["https://app/cb".to_string()],
            allowed_scopes: vec!["openid".to_string(), "profile".to_string()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            require_pkce: false,
            require_consent: true,
            allow_refresh_tokens: true,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            authorization_code_ttl_secs: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_uri_exact_match() {
        let client = test_client();
        assert!(client.has_redirect_uri("https://app/cb"));
        // A trailing slash is a different URI.
        assert!(!client.has_redirect_uri("https://app/cb/"));
        assert!(!client.has_redirect_uri("https://app/CB"));
    }

    #[test]
    fn test_public_client_always_requires_pkce() {
        let mut client = test_client();
        client.client_type = ClientType::Public;
        client.require_pkce = false;

        assert!(client.pkce_required());
    }

    #[test]
    fn test_scope_and_grant_policy() {
        let client = test_client();
        assert!(client.allows_scope("openid"));
        assert!(!client.allows_scope("email"));
        assert!(client.allows_grant_type("authorization_code"));
        assert!(!client.allows_grant_type("client_credentials"));
        assert!(client.allows_response_type("code"));
    }

    #[test]
    fn test_auth_method_parse_roundtrip() {
        for method in [
            TokenEndpointAuthMethod::ClientSecretBasic,
            TokenEndpointAuthMethod::ClientSecretPost,
            TokenEndpointAuthMethod::None,
        ] {
            assert_eq!(
                TokenEndpointAuthMethod::parse(method.as_str()),
                Some(method)
            );
        }
        assert_eq!(TokenEndpointAuthMethod::parse("private_key_jwt"), None);
    }
}
