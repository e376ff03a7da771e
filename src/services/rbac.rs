//! Effective-permission resolution and single/batch permission checks.

use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Permission;
use crate::repositories::PermissionRepository;

pub const REASON_GRANTED: &str = "PERMISSION_GRANTED";
pub const REASON_DENIED: &str = "PERMISSION_DENIED";

/// One entry of a batch permission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionCheck {
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub resource: String,
    pub action: String,
}

/// Outcome for one batch entry, parallel to the request list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub allowed: bool,
    #[serde(rename = "reasonCode")]
    pub reason_code: String,
    pub message: String,
}

/// Service for RBAC evaluation
#[derive(Clone)]
pub struct RbacService {
    permissions: PermissionRepository,
}

impl RbacService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            permissions: PermissionRepository::new(pool),
        }
    }

    /// The user's effective permissions: the union over active,
    /// unexpired role assignments of the active permissions those roles
    /// carry, deduplicated by permission id.
    pub async fn effective_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, ApiError> {
        Ok(self.permissions.find_effective_for_user(user_id).await?)
    }

    /// The effective permission names, for token claims and contexts.
    pub async fn permission_names(&self, user_id: Uuid) -> Result<HashSet<String>, ApiError> {
        let permissions = self.effective_permissions(user_id).await?;
        Ok(permissions.into_iter().map(|p| p.name).collect())
    }

    /// Single check: does the user hold `resource:action`?
    pub async fn has(&self, user_id: Uuid, name: &str) -> Result<bool, ApiError> {
        let names = self.permission_names(user_id).await?;
        Ok(names.contains(name))
    }

    /// Batch check; the result list is parallel to the request list.
    pub async fn check_batch(
        &self,
        user_id: Uuid,
        checks: &[PermissionCheck],
    ) -> Result<Vec<PermissionCheckResult>, ApiError> {
        let names = self.permission_names(user_id).await?;
        Ok(evaluate_batch(&names, checks))
    }
}

/// Evaluate a batch of checks against a resolved permission set.
pub fn evaluate_batch(
    held: &HashSet<String>,
    checks: &[PermissionCheck],
) -> Vec<PermissionCheckResult> {
    checks
        .iter()
        .map(|check| {
            let name = format!("{}:{}", check.resource, check.action);
            let allowed = held.contains(&name);
            PermissionCheckResult {
                request_id: check.request_id.clone(),
                allowed,
                reason_code: if allowed { REASON_GRANTED } else { REASON_DENIED }.to_string(),
                message: if allowed {
                    format!("Permission {} granted", name)
                } else {
                    format!("Permission {} denied", name)
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn check(resource: &str, action: &str) -> PermissionCheck {
        PermissionCheck {
            request_id: None,
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn test_batch_results_parallel_to_requests() {
        let held = held(&["articles:read"]);
        let checks = vec![check("articles", "read"), check("articles", "delete")];

        let results = evaluate_batch(&held, &checks);

        assert_eq!(results.len(), 2);
        assert!(results[0].allowed);
        assert_eq!(results[0].reason_code, REASON_GRANTED);
        assert!(!results[1].allowed);
        assert_eq!(results[1].reason_code, REASON_DENIED);
    }

    #[test]
    fn test_request_id_echoed() {
        let held = held(&[]);
        let checks = vec![PermissionCheck {
            request_id: Some("r-1".to_string()),
            resource: "users".to_string(),
            action: "write".to_string(),
        }];

        let results = evaluate_batch(&held, &checks);
        assert_eq!(results[0].request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_empty_batch() {
        assert!(evaluate_batch(&held(&["a:b"]), &[]).is_empty());
    }
}
