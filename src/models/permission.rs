use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission kind: API permissions gate endpoints, MENU permissions
/// gate navigation entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionType {
    Api,
    Menu,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Api => "API",
            PermissionType::Menu => "MENU",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "API" => Some(PermissionType::Api),
            "MENU" => Some(PermissionType::Menu),
            _ => None,
        }
    }
}

/// Permission domain model. `name` has the form `resource:action` and is
/// immutable once created, as is `permission_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub permission_type: PermissionType,
    pub http_method: Option<String>,
    pub endpoint: Option<String>,
    pub menu_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PermissionRow {
    pub id: String,
    pub name: String,
    pub permission_type: String,
    pub http_method: Option<String>,
    pub endpoint: Option<String>,
    pub menu_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            permission_type: PermissionType::parse(&row.permission_type)
                .unwrap_or(PermissionType::Api),
            http_method: row.http_method,
            endpoint: row.endpoint,
            menu_id: row.menu_id,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Permission {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Permission::from(PermissionRow::from_row(row)?))
    }
}

impl Permission {
    /// The `resource` half of `resource:action`.
    pub fn resource(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// The `action` half of `resource:action`.
    pub fn action(&self) -> &str {
        self.name.split(':').nth(1).unwrap_or("")
    }
}

/// Validate a permission name: `resource:action`, both halves non-empty
/// and drawn from the scope character set.
pub fn is_valid_permission_name(name: &str) -> bool {
    let mut parts = name.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(resource), Some(action), None) => {
            !resource.is_empty()
                && !action.is_empty()
                && resource.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                && action.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_name_parts() {
        let permission = Permission {
            id: Uuid::new_v4(),
            name: "articles:read".to_string(),
            permission_type: PermissionType::Api,
            http_method: Some("GET".to_string()),
            endpoint: Some("/articles".to_string()),
            menu_id: None,
            is_active: true,
            created_at: Utc::now(),
        };

        assert_eq!(permission.resource(), "articles");
        assert_eq!(permission.action(), "read");
    }

    #[test]
    fn test_permission_name_validation() {
        assert!(is_valid_permission_name("articles:read"));
        assert!(is_valid_permission_name("user_admin:bulk-delete"));
        assert!(!is_valid_permission_name("articles"));
        assert!(!is_valid_permission_name("articles:"));
        assert!(!is_valid_permission_name(":read"));
        assert!(!is_valid_permission_name("a:b:c"));
        assert!(!is_valid_permission_name("with space:read"));
    }

    #[test]
    fn test_permission_type_parse() {
        assert_eq!(PermissionType::parse("API"), Some(PermissionType::Api));
        assert_eq!(PermissionType::parse("MENU"), Some(PermissionType::Menu));
        assert_eq!(PermissionType::parse("api"), None);
    }
}
