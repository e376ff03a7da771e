pub mod bearer_auth;
pub mod permission_gate;
pub mod rate_limit;

use axum::http::HeaderMap;

use crate::services::audit::AuditContext;

pub use bearer_auth::{bearer_auth_middleware, AuthContext};
pub use permission_gate::require_permissions;
pub use rate_limit::{check_rate_limit, check_rate_limit_api, RateLimiter, UnlimitedRateLimiter};

/// Build the audit context for a request from its headers.
pub fn audit_context(headers: &HeaderMap) -> AuditContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    AuditContext {
        ip_address,
        user_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_audit_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("curl/8.0"),
        );

        let ctx = audit_context(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));

        let empty = audit_context(&HeaderMap::new());
        assert!(empty.ip_address.is_none());
        assert!(empty.user_agent.is_none());
    }
}
