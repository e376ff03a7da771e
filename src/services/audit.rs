//! Audit event emission.
//!
//! Audit writes are fire-and-forget: they must never block a response
//! for longer than a bounded timeout, and a failed write is logged but
//! never propagated to the client.

use sqlx::MySqlPool;
use std::time::Duration;
use uuid::Uuid;

use crate::models::AuditAction;
use crate::repositories::AuditEventRepository;

/// Upper bound on how long an audit write may run.
const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Request-scoped caller metadata attached to audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A single audit event to be recorded.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    pub resource: &'static str,
    pub resource_id: Option<String>,
    pub success: bool,
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, resource: &'static str) -> Self {
        Self {
            action,
            actor_id: None,
            resource,
            resource_id: None,
            success: true,
            metadata: None,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn failure(mut self) -> Self {
        self.success = false;
        self
    }

    /// Attach metadata. Callers never place passwords or raw tokens here.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Service for audit logging
#[derive(Clone)]
pub struct AuditService {
    repo: AuditEventRepository,
}

impl AuditService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            repo: AuditEventRepository::new(pool),
        }
    }

    /// Emit an audit event without blocking the caller. The write runs
    /// on a detached task bounded by `AUDIT_WRITE_TIMEOUT`.
    pub fn emit(&self, entry: AuditEntry, ctx: &AuditContext) {
        let repo = self.repo.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let write = repo.create(
                entry.action,
                entry.actor_id,
                entry.resource,
                entry.resource_id.as_deref(),
                entry.success,
                ctx.ip_address.as_deref(),
                ctx.user_agent.as_deref(),
                entry.metadata,
            );

            match tokio::time::timeout(AUDIT_WRITE_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(action = entry.action.as_str(), error = %e, "audit write failed")
                }
                Err(_) => {
                    tracing::warn!(action = entry.action.as_str(), "audit write timed out")
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let actor = Uuid::new_v4();
        let entry = AuditEntry::new(AuditAction::TokenIssued, "token")
            .actor(actor)
            .resource_id("jti-1")
            .metadata(serde_json::json!({"grant_type": "authorization_code"}));

        assert_eq!(entry.action, AuditAction::TokenIssued);
        assert_eq!(entry.actor_id, Some(actor));
        assert_eq!(entry.resource, "token");
        assert_eq!(entry.resource_id.as_deref(), Some("jti-1"));
        assert!(entry.success);

        let denied = AuditEntry::new(AuditAction::AuthzDeny, "permission").failure();
        assert!(!denied.success);
    }
}
