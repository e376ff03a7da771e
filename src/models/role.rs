use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role names the system ships with. These cannot be deleted, and
/// `SYSTEM_ADMIN` additionally cannot be deactivated.
pub const RESERVED_ROLE_NAMES: &[&str] = &[
    "SYSTEM_ADMIN",
    "USER",
    "USER_ADMIN",
    "PERMISSION_ADMIN",
    "CLIENT_ADMIN",
    "AUDIT_ADMIN",
];

pub const SYSTEM_ADMIN_ROLE: &str = "SYSTEM_ADMIN";

/// Role domain model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            display_name: row.display_name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Role {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Role::from(RoleRow::from_row(row)?))
    }
}

impl Role {
    pub fn is_reserved(&self) -> bool {
        RESERVED_ROLE_NAMES.contains(&self.name.as_str())
    }

    pub fn is_system_admin(&self) -> bool {
        self.name == SYSTEM_ADMIN_ROLE
    }
}

/// A role assignment, optionally expiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRoleRow {
    pub user_id: String,
    pub role_id: String,
    pub assigned_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRoleRow> for UserRole {
    fn from(row: UserRoleRow) -> Self {
        Self {
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            role_id: Uuid::parse_str(&row.role_id).unwrap_or_default(),
            assigned_by: row.assigned_by.and_then(|id| Uuid::parse_str(&id).ok()),
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for UserRole {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(UserRole::from(UserRoleRow::from_row(row)?))
    }
}

impl UserRole {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| t <= Utc::now()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reserved_roles() {
        let role = Role {
            id: Uuid::new_v4(),
            name: "SYSTEM_ADMIN".to_string(),
            display_name: "System Administrator".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(role.is_reserved());
        assert!(role.is_system_admin());

        let custom = Role {
            name: "editors".to_string(),
            ..role
        };
        assert!(!custom.is_reserved());
        assert!(!custom.is_system_admin());
    }

    #[test]
    fn test_user_role_expiry() {
        let assignment = UserRole {
            user_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            assigned_by: None,
            expires_at: Some(Utc::now() - Duration::hours(1)),
            created_at: Utc::now(),
        };
        assert!(assignment.is_expired());

        let open_ended = UserRole {
            expires_at: None,
            ..assignment
        };
        assert!(!open_ended.is_expired());
    }
}
