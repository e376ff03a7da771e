//! Self-service account endpoints: connected apps and permission
//! checks for the authenticated user.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};

use crate::config::AppState;
use crate::dto::admin::{ConnectedApp, ListQuery};
use crate::dto::{ApiResponse, Paged};
use crate::error::ApiError;
use crate::middleware::{audit_context, AuthContext};
use crate::models::{AuditAction, LoginAttempt};
use crate::repositories::{ClientRepository, LoginAttemptRepository};
use crate::services::audit::AuditEntry;
use crate::services::{ConsentService, PermissionCheck, PermissionCheckResult, RbacService};

/// GET /account/connected-apps - clients the user has authorized
pub async fn connected_apps_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<ConnectedApp>>>, ApiError> {
    let user_id = ctx.require_user()?;

    let consents = ConsentService::new(state.pool.clone())
        .list_for_user(user_id)
        .await?;
    let clients = ClientRepository::new(state.pool.clone());

    let mut apps = Vec::with_capacity(consents.len());
    for grant in consents {
        if let Some(client) = clients.find_by_id(grant.client_id).await? {
            apps.push(ConnectedApp {
                client_id: client.client_id,
                name: client.name,
                scopes: grant.scopes(),
                granted_at: grant.issued_at,
            });
        }
    }

    Ok(Json(ApiResponse::ok(apps)))
}

/// DELETE /account/connected-apps/:client_id - withdraw consent
///
/// Revokes every token issued under the consent before deleting it.
pub async fn revoke_consent_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    let user_id = ctx.require_user()?;

    let client = ClientRepository::new(state.pool.clone())
        .find_by_client_id(&client_id)
        .await?
        .ok_or(ApiError::NotFound("client"))?;

    ConsentService::new(state.pool.clone())
        .revoke(user_id, client.id)
        .await?;

    state.audit.emit(
        AuditEntry::new(AuditAction::ConsentRevoked, "consent")
            .actor(user_id)
            .resource_id(client.client_id),
        &audit_ctx,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /account/permissions - the caller's effective permission names
pub async fn my_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let user_id = ctx.require_user()?;

    let mut names: Vec<String> = RbacService::new(state.pool.clone())
        .permission_names(user_id)
        .await?
        .into_iter()
        .collect();
    names.sort();

    Ok(Json(ApiResponse::ok(names)))
}

/// POST /account/permissions/check - single permission check
pub async fn check_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(check): Json<PermissionCheck>,
) -> Result<Json<PermissionCheckResult>, ApiError> {
    let user_id = ctx.require_user()?;

    let results = RbacService::new(state.pool.clone())
        .check_batch(user_id, std::slice::from_ref(&check))
        .await?;

    let result = results
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::InternalError(anyhow::anyhow!("empty batch result")))?;

    Ok(Json(result))
}

/// GET /account/login-attempts - the caller's recent sign-in history
pub async fn login_attempts_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<LoginAttempt>>>, ApiError> {
    let user_id = ctx.require_user()?;

    let (attempts, total) = LoginAttemptRepository::new(state.pool.clone())
        .list_for_user(user_id, query.limit(), query.offset())
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: attempts,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// POST /account/permissions/check-batch - batch permission check
///
/// The response list is parallel to the request list.
pub async fn batch_check_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(checks): Json<Vec<PermissionCheck>>,
) -> Result<Json<Vec<PermissionCheckResult>>, ApiError> {
    let user_id = ctx.require_user()?;

    let results = RbacService::new(state.pool.clone())
        .check_batch(user_id, &checks)
        .await?;

    Ok(Json(results))
}
