use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which kind of token a blacklist entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

/// Record of an issued access token. The raw JWT is never stored; the
/// record is located by `jti` or by the SHA-256 digest of the full token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRow {
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<String>,
    pub client_id: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<AccessTokenRow> for AccessTokenRecord {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            jti: row.jti,
            token_hash: row.token_hash,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scope: row.scope,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AccessTokenRecord {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AccessTokenRecord::from(AccessTokenRow::from_row(row)?))
    }
}

impl AccessTokenRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Record of an issued refresh token. `previous_token_id` links each
/// rotation to the token it replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub previous_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<String>,
    pub client_id: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub previous_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            jti: row.jti,
            token_hash: row.token_hash,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scope: row.scope,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
            previous_token_id: row.previous_token_id,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for RefreshTokenRecord {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(RefreshTokenRecord::from(RefreshTokenRow::from_row(row)?))
    }
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_kind_parse() {
        assert_eq!(TokenKind::parse("access"), Some(TokenKind::Access));
        assert_eq!(TokenKind::parse("refresh"), Some(TokenKind::Refresh));
        assert_eq!(TokenKind::parse("Bearer"), None);
    }

    #[test]
    fn test_refresh_scopes_split() {
        let record = RefreshTokenRecord {
            jti: "j1".to_string(),
            token_hash: "h".to_string(),
            user_id: None,
            client_id: Uuid::new_v4(),
            scope: "openid profile offline_access".to_string(),
            expires_at: Utc::now(),
            is_revoked: false,
            revoked_at: None,
            previous_token_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(
            record.scopes(),
            vec!["openid", "profile", "offline_access"]
        );
    }
}
