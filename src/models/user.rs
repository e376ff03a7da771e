use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User domain model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub must_change_password: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for MySQL query results
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub must_change_password: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            is_active: row.is_active,
            email_verified: row.email_verified,
            must_change_password: row.must_change_password,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            last_failed_login: row.last_failed_login,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for User {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let user_row = UserRow::from_row(row)?;
        Ok(User::from(user_row))
    }
}

impl User {
    /// A locked user must not authenticate by password, even with the
    /// correct one.
    pub fn is_locked(&self) -> bool {
        self.locked_until.map(|t| t > Utc::now()).unwrap_or(false)
    }

    /// Whether password authentication is currently possible at all.
    pub fn can_authenticate(&self) -> bool {
        self.is_active && !self.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password_hash: "$2b$12$hash".to_string(),
            display_name: None,
            is_active: true,
            email_verified: true,
            must_change_password: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_failed_login: None,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_locked_user_cannot_authenticate() {
        let mut user = test_user();
        user.locked_until = Some(Utc::now() + Duration::minutes(10));

        assert!(user.is_locked());
        assert!(!user.can_authenticate());
    }

    #[test]
    fn test_expired_lock_is_not_locked() {
        let mut user = test_user();
        user.locked_until = Some(Utc::now() - Duration::minutes(1));

        assert!(!user.is_locked());
        assert!(user.can_authenticate());
    }

    #[test]
    fn test_inactive_user_cannot_authenticate() {
        let mut user = test_user();
        user.is_active = false;

        assert!(!user.can_authenticate());
    }
}
