//! Cookie-backed login sessions for the front-channel authorize flow.
//!
//! The cookie carries an opaque high-entropy token; the store holds only
//! its digest. Cookies are HttpOnly and SameSite=Lax, and Secure outside
//! development.

use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::models::{Session, User};
use crate::repositories::{SessionRepository, UserRepository};
use crate::utils::token::{generate_credential, hash_token};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// Service for login sessions
#[derive(Clone)]
pub struct SessionService {
    sessions: SessionRepository,
    users: UserRepository,
    ttl_secs: i64,
    cookie_secure: bool,
}

impl SessionService {
    pub fn new(pool: MySqlPool, ttl_secs: i64, cookie_secure: bool) -> Self {
        Self {
            sessions: SessionRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            ttl_secs,
            cookie_secure,
        }
    }

    /// Start a session for an authenticated user. Returns the raw cookie
    /// token (never stored) and the session record.
    pub async fn start(
        &self,
        user_id: uuid::Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(String, Session), StoreError> {
        let token = generate_credential();
        let session = self
            .sessions
            .create(&hash_token(&token), user_id, self.ttl_secs, ip_address, user_agent)
            .await?;

        Ok((token, session))
    }

    /// Resolve the user behind a Cookie header, if the session is live
    /// and the user still active.
    pub async fn authenticate(&self, cookie_header: Option<&str>) -> Result<Option<User>, StoreError> {
        let Some(token) = cookie_header.and_then(|h| parse_cookie(h, SESSION_COOKIE)) else {
            return Ok(None);
        };

        let Some(session) = self
            .sessions
            .find_valid_by_token_hash(&hash_token(token))
            .await?
        else {
            return Ok(None);
        };

        let user = self.users.find_by_id(session.user_id).await?;
        Ok(user.filter(|u| u.is_active))
    }

    /// End the session named by the Cookie header, if any.
    pub async fn end(&self, cookie_header: Option<&str>) -> Result<(), StoreError> {
        if let Some(token) = cookie_header.and_then(|h| parse_cookie(h, SESSION_COOKIE)) {
            self.sessions.delete_by_token_hash(&hash_token(token)).await?;
        }
        Ok(())
    }

    /// Set-Cookie value for a fresh session token.
    pub fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, token, self.ttl_secs
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Set-Cookie value that clears the session cookie.
    pub fn clearing_cookie(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }
}

/// Extract a named cookie from a Cookie header value.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie() {
        assert_eq!(parse_cookie("sid=abc123", "sid"), Some("abc123"));
        assert_eq!(
            parse_cookie("theme=dark; sid=abc123; lang=en", "sid"),
            Some("abc123")
        );
        assert_eq!(parse_cookie("theme=dark", "sid"), None);
        // Prefix of another cookie name must not match.
        assert_eq!(parse_cookie("sid2=x", "sid"), None);
        assert_eq!(parse_cookie("", "sid"), None);
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let pool = MySqlPool::connect_lazy("mysql://localhost/test").unwrap();
        let service = SessionService::new(pool.clone(), 3600, true);
        let cookie = service.cookie("tok");
        assert!(cookie.starts_with("sid=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("Secure"));

        let dev = SessionService::new(pool, 3600, false);
        assert!(!dev.cookie("tok").contains("Secure"));
        assert!(dev.clearing_cookie().contains("Max-Age=0"));
    }
}
