//! Bearer-token authentication for resource endpoints.
//!
//! Extracts the bearer JWT, verifies it, consults the blacklist and the
//! stored token record, and injects an [`AuthContext`] into request
//! extensions for handlers and permission gates.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::AppState;
use crate::error::{ApiError, AuthError};
use crate::repositories::{AccessTokenRepository, BlacklistRepository};
use crate::services::rbac::RbacService;
use crate::utils::token::verify_token_hash;

/// The authenticated caller of a resource request.
///
/// `user_id` is absent for client-credentials tokens. Permissions are
/// resolved live through the RBAC engine for user tokens, so a role
/// change takes effect before the token expires.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Option<Uuid>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub permissions: HashSet<String>,
    pub jti: String,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    /// The user id, or `Unauthorized` for tokens without a user subject.
    pub fn require_user(&self) -> Result<Uuid, ApiError> {
        self.user_id.ok_or(ApiError::Unauthorized)
    }
}

/// Extract the bearer token from an Authorization header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidToken)
}

/// Bearer authentication middleware
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_bearer(header)?;

    // Signature, issuer, audience, expiry.
    let claims = state.jwt_manager.verify_access_token(token)?;

    // Deny-list wins over an otherwise-valid signature.
    let blacklist = BlacklistRepository::new(state.pool.clone());
    if blacklist.contains(&claims.jti).await? {
        return Err(AuthError::TokenRevoked);
    }

    // The stored record must exist and match the presented token.
    let records = AccessTokenRepository::new(state.pool.clone());
    let record = records
        .find_by_jti(&claims.jti)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if record.is_expired() || !verify_token_hash(token, &record.token_hash) {
        return Err(AuthError::InvalidToken);
    }

    let permissions = match record.user_id {
        Some(user_id) => {
            let rbac = RbacService::new(state.pool.clone());
            rbac.permission_names(user_id).await.map_err(|_| {
                AuthError::InternalError(anyhow::anyhow!("permission resolution failed"))
            })?
        }
        None => claims
            .permissions
            .clone()
            .map(|p| p.into_iter().collect())
            .unwrap_or_default(),
    };

    let context = AuthContext {
        user_id: record.user_id,
        client_id: claims.client_id.clone(),
        scopes: claims.scopes(),
        permissions,
        jti: claims.jti.clone(),
    };

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(extract_bearer(Some("Bearer  spaced ")).unwrap(), "spaced");
    }

    #[test]
    fn test_extract_bearer_failures() {
        assert!(matches!(extract_bearer(None), Err(AuthError::MissingToken)));
        assert!(matches!(
            extract_bearer(Some("Basic abc")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer ")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            extract_bearer(Some("bearer abc")),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_context_scope_and_permission_lookup() {
        let ctx = AuthContext {
            user_id: Some(Uuid::new_v4()),
            client_id: "c1".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            permissions: ["articles:read".to_string()].into_iter().collect(),
            jti: "j1".to_string(),
        };

        assert!(ctx.has_scope("openid"));
        assert!(!ctx.has_scope("email"));
        assert!(ctx.has_permission("articles:read"));
        assert!(!ctx.has_permission("articles:write"));
        assert!(ctx.require_user().is_ok());

        let machine = AuthContext { user_id: None, ..ctx };
        assert!(machine.require_user().is_err());
    }
}
