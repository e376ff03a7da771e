//! Rate-limit checkpoint.
//!
//! The counters themselves live outside this system; [`RateLimiter`] is
//! the port they are consumed through, keyed by `(client_id, remote_ip)`.
//! The default implementation permits everything, the same way recovery
//! emails are handed to a delivery seam rather than an SMTP stack.
//! Exceeding a limit answers 429 and lands in the audit trail.

use crate::config::AppState;
use crate::error::{ApiError, OAuthError};
use crate::models::AuditAction;
use crate::services::audit::{AuditContext, AuditEntry};

/// External rate-limit counters, consumed as an interface.
pub trait RateLimiter: Send + Sync {
    /// Whether another request under this key may proceed. `key` is the
    /// client id on OAuth endpoints and the endpoint name elsewhere.
    fn is_allowed(&self, key: &str, remote_ip: Option<&str>) -> bool;
}

/// Default limiter: no limits.
pub struct UnlimitedRateLimiter;

impl RateLimiter for UnlimitedRateLimiter {
    fn is_allowed(&self, _key: &str, _remote_ip: Option<&str>) -> bool {
        true
    }
}

fn consume(state: &AppState, key: &str, audit_ctx: &AuditContext) -> bool {
    let allowed = state
        .rate_limiter
        .is_allowed(key, audit_ctx.ip_address.as_deref());

    if !allowed {
        state.audit.emit(
            AuditEntry::new(AuditAction::RateLimitExceeded, "rate_limit")
                .failure()
                .resource_id(key.to_string()),
            audit_ctx,
        );
    }

    allowed
}

/// Checkpoint for OAuth endpoints; maps an exceeded limit to 429
/// `temporarily_unavailable`.
pub fn check_rate_limit(
    state: &AppState,
    client_id: &str,
    audit_ctx: &AuditContext,
) -> Result<(), OAuthError> {
    if consume(state, client_id, audit_ctx) {
        Ok(())
    } else {
        Err(OAuthError::TemporarilyUnavailable)
    }
}

/// Checkpoint for the non-OAuth surface; maps an exceeded limit to the
/// 429 envelope.
pub fn check_rate_limit_api(
    state: &AppState,
    key: &str,
    audit_ctx: &AuditContext,
) -> Result<(), ApiError> {
    if consume(state, key, audit_ctx) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    impl RateLimiter for DenyAll {
        fn is_allowed(&self, _key: &str, _remote_ip: Option<&str>) -> bool {
            false
        }
    }

    #[test]
    fn test_default_limiter_allows() {
        assert!(UnlimitedRateLimiter.is_allowed("c1", Some("203.0.113.7")));
        assert!(UnlimitedRateLimiter.is_allowed("login", None));
    }

    #[test]
    fn test_limiters_are_object_safe() {
        let limiters: Vec<Box<dyn RateLimiter>> =
            vec![Box::new(UnlimitedRateLimiter), Box::new(DenyAll)];

        assert!(limiters[0].is_allowed("c1", None));
        assert!(!limiters[1].is_allowed("c1", None));
    }
}
