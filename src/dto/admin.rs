//! Wire types for the permission-gated admin surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Client, ClientType, PermissionType, Role, TokenEndpointAuthMethod, UserRole};

fn default_limit() -> i64 {
    50
}

/// Common paging query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub q: Option<String>,
    pub is_active: Option<bool>,
    pub action: Option<String>,
}

impl ListQuery {
    /// Clamp paging to sane bounds.
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub must_change_password: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A user's roles: the currently effective ones plus the raw
/// assignments with their expiry and assigner.
#[derive(Debug, Clone, Serialize)]
pub struct UserRolesResponse {
    pub roles: Vec<Role>,
    pub assignments: Vec<UserRole>,
}

// ============================================================================
// Clients
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub token_endpoint_auth_method: Option<TokenEndpointAuthMethod>,
    /// PKCE opt-out is only honored for confidential clients.
    pub require_pkce: Option<bool>,
    #[serde(default)]
    pub require_consent: Option<bool>,
    #[serde(default)]
    pub allow_refresh_tokens: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
    pub authorization_code_ttl_secs: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClientRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub require_consent: bool,
    pub allow_refresh_tokens: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
}

/// Registration response; the only time the plain secret appears.
#[derive(Debug, Clone, Serialize)]
pub struct ClientCreatedResponse {
    pub client: Client,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecretRegeneratedResponse {
    pub client_id: String,
    pub client_secret: String,
}

// ============================================================================
// Scopes, roles, permissions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScopeRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScopeRequest {
    pub description: Option<String>,
    pub is_public: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleRequest {
    pub display_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub permission_type: PermissionType,
    pub http_method: Option<String>,
    pub endpoint: Option<String>,
    pub menu_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePermissionRequest {
    pub http_method: Option<String>,
    pub endpoint: Option<String>,
    pub menu_id: Option<String>,
    pub is_active: bool,
}

// ============================================================================
// Consents
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedApp {
    pub client_id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
}
