use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user's persisted approval of scopes for a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConsentGrantRow {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<ConsentGrantRow> for ConsentGrant {
    fn from(row: ConsentGrantRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scope: row.scope,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for ConsentGrant {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(ConsentGrant::from(ConsentGrantRow::from_row(row)?))
    }
}

impl ConsentGrant {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| t <= Utc::now()).unwrap_or(false)
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }

    /// Whether this grant covers every requested scope.
    pub fn covers(&self, requested: &[String]) -> bool {
        if self.is_expired() {
            return false;
        }
        let granted: Vec<&str> = self.scope.split_whitespace().collect();
        requested.iter().all(|s| granted.contains(&s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(scope: &str, expires_at: Option<DateTime<Utc>>) -> ConsentGrant {
        ConsentGrant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            scope: scope.to_string(),
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_covers_subset() {
        let g = grant("openid profile email", None);
        assert!(g.covers(&["openid".to_string()]));
        assert!(g.covers(&["openid".to_string(), "email".to_string()]));
        assert!(!g.covers(&["openid".to_string(), "articles:read".to_string()]));
        assert!(g.covers(&[]));
    }

    #[test]
    fn test_expired_grant_covers_nothing() {
        let g = grant("openid", Some(Utc::now() - Duration::hours(1)));
        assert!(!g.covers(&["openid".to_string()]));
    }
}
