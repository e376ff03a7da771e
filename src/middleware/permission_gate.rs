//! Required-permission gate for protected handlers.
//!
//! Handlers declare the permissions they need and call the gate first;
//! a miss responds 403 `insufficient_permissions` without naming the
//! missing permission, and emits an AUTHZ_DENY audit event.

use crate::config::AppState;
use crate::error::ApiError;
use crate::middleware::bearer_auth::AuthContext;
use crate::models::AuditAction;
use crate::services::audit::{AuditContext, AuditEntry};

/// Require every listed permission on the context.
///
/// # Returns
/// * `Ok(())` - The caller holds all required permissions
/// * `Err(ApiError::Forbidden)` - At least one is missing; an audit
///   event has been emitted
pub fn require_permissions(
    state: &AppState,
    ctx: &AuthContext,
    required: &[&str],
    audit_ctx: &AuditContext,
) -> Result<(), ApiError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|p| !ctx.has_permission(p))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let mut entry = AuditEntry::new(AuditAction::AuthzDeny, "permission")
        .failure()
        .resource_id(ctx.client_id.clone())
        // The denied caller never learns which permission was missing;
        // the audit trail does.
        .metadata(serde_json::json!({ "missing": missing }));
    if let Some(user_id) = ctx.user_id {
        entry = entry.actor(user_id);
    }
    state.audit.emit(entry, audit_ctx);

    Err(ApiError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn ctx(permissions: &[&str]) -> AuthContext {
        AuthContext {
            user_id: Some(Uuid::new_v4()),
            client_id: "c1".to_string(),
            scopes: vec![],
            permissions: permissions.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            jti: "j".to_string(),
        }
    }

    #[test]
    fn test_all_required_present() {
        let ctx = ctx(&["users:read", "users:write"]);
        // Pure check, no state needed when nothing is missing.
        assert!(["users:read", "users:write"]
            .iter()
            .all(|p| ctx.has_permission(p)));
    }

    #[test]
    fn test_missing_permission_detected() {
        let ctx = ctx(&["users:read"]);
        assert!(!ctx.has_permission("users:write"));
    }
}
