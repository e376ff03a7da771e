use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    Register,
    AuthorizeRequested,
    CodeIssued,
    ConsentGranted,
    ConsentDenied,
    ConsentRevoked,
    TokenIssued,
    TokenRefreshed,
    TokenRevoked,
    TokenIntrospected,
    AuthzDeny,
    RateLimitExceeded,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
    EmailVerified,
    UserCreated,
    UserUpdated,
    UserDeactivated,
    UserActivated,
    UserUnlocked,
    UserDeleted,
    ClientCreated,
    ClientUpdated,
    ClientDeleted,
    ClientSecretRegenerated,
    ScopeCreated,
    ScopeUpdated,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    RoleAssigned,
    RoleRemoved,
    PermissionCreated,
    PermissionUpdated,
    PermissionAssigned,
    PermissionRemoved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::Register => "REGISTER",
            AuditAction::AuthorizeRequested => "AUTHORIZE_REQUESTED",
            AuditAction::CodeIssued => "CODE_ISSUED",
            AuditAction::ConsentGranted => "CONSENT_GRANTED",
            AuditAction::ConsentDenied => "CONSENT_DENIED",
            AuditAction::ConsentRevoked => "CONSENT_REVOKED",
            AuditAction::TokenIssued => "TOKEN_ISSUED",
            AuditAction::TokenRefreshed => "TOKEN_REFRESHED",
            AuditAction::TokenRevoked => "TOKEN_REVOKED",
            AuditAction::TokenIntrospected => "TOKEN_INTROSPECTED",
            AuditAction::AuthzDeny => "AUTHZ_DENY",
            AuditAction::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AuditAction::PasswordChanged => "PASSWORD_CHANGED",
            AuditAction::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            AuditAction::PasswordReset => "PASSWORD_RESET",
            AuditAction::EmailVerified => "EMAIL_VERIFIED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::UserDeactivated => "USER_DEACTIVATED",
            AuditAction::UserActivated => "USER_ACTIVATED",
            AuditAction::UserUnlocked => "USER_UNLOCKED",
            AuditAction::UserDeleted => "USER_DELETED",
            AuditAction::ClientCreated => "CLIENT_CREATED",
            AuditAction::ClientUpdated => "CLIENT_UPDATED",
            AuditAction::ClientDeleted => "CLIENT_DELETED",
            AuditAction::ClientSecretRegenerated => "CLIENT_SECRET_REGENERATED",
            AuditAction::ScopeCreated => "SCOPE_CREATED",
            AuditAction::ScopeUpdated => "SCOPE_UPDATED",
            AuditAction::RoleCreated => "ROLE_CREATED",
            AuditAction::RoleUpdated => "ROLE_UPDATED",
            AuditAction::RoleDeleted => "ROLE_DELETED",
            AuditAction::RoleAssigned => "ROLE_ASSIGNED",
            AuditAction::RoleRemoved => "ROLE_REMOVED",
            AuditAction::PermissionCreated => "PERMISSION_CREATED",
            AuditAction::PermissionUpdated => "PERMISSION_UPDATED",
            AuditAction::PermissionAssigned => "PERMISSION_ASSIGNED",
            AuditAction::PermissionRemoved => "PERMISSION_REMOVED",
        }
    }
}

/// An append-only audit record. Metadata never contains passwords or raw
/// tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub resource: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditEventRow {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub action: String,
    pub actor_id: Option<String>,
    pub resource: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<AuditEventRow> for AuditEvent {
    fn from(row: AuditEventRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            occurred_at: row.occurred_at,
            action: row.action,
            actor_id: row.actor_id.and_then(|id| Uuid::parse_str(&id).ok()),
            resource: row.resource,
            resource_id: row.resource_id,
            success: row.success,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            metadata: row.metadata,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuditEvent {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AuditEvent::from(AuditEventRow::from_row(row)?))
    }
}

/// Append-only record of a password authentication attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub username: String,
    pub user_id: Option<Uuid>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LoginAttemptRow {
    pub id: String,
    pub username: String,
    pub user_id: Option<String>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LoginAttemptRow> for LoginAttempt {
    fn from(row: LoginAttemptRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            username: row.username,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            success: row.success,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for LoginAttempt {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(LoginAttempt::from(LoginAttemptRow::from_row(row)?))
    }
}
