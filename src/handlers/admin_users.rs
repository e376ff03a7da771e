//! Admin user management. Every handler is bearer-authenticated and
//! gated on a `users:*` permission; every mutation lands in the audit
//! trail.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::admin::{
    AssignRoleRequest, CreateUserRequest, ListQuery, UpdateUserRequest, UserRolesResponse,
};
use crate::dto::auth::UserSummary;
use crate::dto::{ApiResponse, Paged};
use crate::error::ApiError;
use crate::middleware::{audit_context, require_permissions, AuthContext};
use crate::models::AuditAction;
use crate::repositories::{UserFilter, UserRepository, UserRoleRepository, RoleRepository};
use crate::services::audit::AuditEntry;
use crate::services::{AccountPolicy, AccountService};

/// GET /admin/users
pub async fn list_users_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<UserSummary>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:read"], &audit_ctx)?;

    let filter = UserFilter {
        username_contains: query.q.clone(),
        is_active: query.is_active,
    };
    let (users, total) = UserRepository::new(state.pool.clone())
        .list(query.limit(), query.offset(), &filter)
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: users.iter().map(UserSummary::from).collect(),
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// GET /admin/users/:user_id
pub async fn get_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserSummary>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:read"], &audit_ctx)?;

    let user = UserRepository::new(state.pool.clone())
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(ApiResponse::ok(UserSummary::from(&user))))
}

/// POST /admin/users
pub async fn create_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserSummary>>), ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    let account = AccountService::new(
        state.pool.clone(),
        AccountPolicy {
            password_policy: state.config.password_policy(),
            history_depth: state.config.password_history_depth,
            max_failed_logins: state.config.max_failed_logins,
            lockout_minutes: state.config.lockout_minutes,
            reset_token_ttl_secs: state.config.reset_token_ttl_secs,
        },
    );

    let (user, _verification) = account
        .register(
            &request.username,
            request.email.as_deref(),
            &request.password,
            request.must_change_password,
        )
        .await?;

    let mut entry = AuditEntry::new(AuditAction::UserCreated, "user").resource_id(user.id.to_string());
    if let Some(actor) = ctx.user_id {
        entry = entry.actor(actor);
    }
    state.audit.emit(entry, &audit_ctx);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserSummary::from(&user))),
    ))
}

/// PUT /admin/users/:user_id
pub async fn update_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserSummary>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    users
        .update_profile(
            user.id,
            request.email.as_deref().or(user.email.as_deref()),
            request.display_name.as_deref().or(user.display_name.as_deref()),
        )
        .await?;

    audit_user_mutation(&state, &ctx, AuditAction::UserUpdated, user.id, &audit_ctx);

    let updated = users
        .find_by_id(user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(ApiResponse::ok(UserSummary::from(&updated))))
}

/// POST /admin/users/:user_id/deactivate - soft delete
pub async fn deactivate_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    if !UserRepository::new(state.pool.clone())
        .set_active(user_id, false)
        .await?
    {
        return Err(ApiError::NotFound("user"));
    }

    audit_user_mutation(&state, &ctx, AuditAction::UserDeactivated, user_id, &audit_ctx);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/:user_id/activate
pub async fn activate_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    if !UserRepository::new(state.pool.clone())
        .set_active(user_id, true)
        .await?
    {
        return Err(ApiError::NotFound("user"));
    }

    audit_user_mutation(&state, &ctx, AuditAction::UserActivated, user_id, &audit_ctx);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/:user_id/unlock - clear lockout counters
pub async fn unlock_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    let users = UserRepository::new(state.pool.clone());
    users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    users.unlock(user_id).await?;

    audit_user_mutation(&state, &ctx, AuditAction::UserUnlocked, user_id, &audit_ctx);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/users/:user_id - hard delete with cascade
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:write"], &audit_ctx)?;

    if !UserRepository::new(state.pool.clone()).delete(user_id).await? {
        return Err(ApiError::NotFound("user"));
    }

    audit_user_mutation(&state, &ctx, AuditAction::UserDeleted, user_id, &audit_ctx);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/users/:user_id/roles
pub async fn get_user_roles_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserRolesResponse>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["users:read", "roles:read"], &audit_ctx)?;

    let user_roles = UserRoleRepository::new(state.pool.clone());
    let roles = user_roles.list_active_roles(user_id).await?;
    let assignments = user_roles.list_assignments(user_id).await?;

    Ok(Json(ApiResponse::ok(UserRolesResponse { roles, assignments })))
}

/// POST /admin/users/:user_id/roles - assign a role, optionally expiring
pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AssignRoleRequest>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:write"], &audit_ctx)?;

    UserRepository::new(state.pool.clone())
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let role = RoleRepository::new(state.pool.clone())
        .find_by_id(request.role_id)
        .await?
        .ok_or(ApiError::NotFound("role"))?;

    UserRoleRepository::new(state.pool.clone())
        .assign(user_id, role.id, ctx.user_id, request.expires_at)
        .await?;

    let mut entry = AuditEntry::new(AuditAction::RoleAssigned, "user")
        .resource_id(user_id.to_string())
        .metadata(serde_json::json!({ "role": role.name }));
    if let Some(actor) = ctx.user_id {
        entry = entry.actor(actor);
    }
    state.audit.emit(entry, &audit_ctx);

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/users/:user_id/roles/:role_id
pub async fn remove_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:write"], &audit_ctx)?;

    if !UserRoleRepository::new(state.pool.clone())
        .remove(user_id, role_id)
        .await?
    {
        return Err(ApiError::NotFound("role assignment"));
    }

    let mut entry = AuditEntry::new(AuditAction::RoleRemoved, "user")
        .resource_id(user_id.to_string())
        .metadata(serde_json::json!({ "role_id": role_id }));
    if let Some(actor) = ctx.user_id {
        entry = entry.actor(actor);
    }
    state.audit.emit(entry, &audit_ctx);

    Ok(StatusCode::NO_CONTENT)
}

fn audit_user_mutation(
    state: &AppState,
    ctx: &AuthContext,
    action: AuditAction,
    user_id: Uuid,
    audit_ctx: &crate::services::AuditContext,
) {
    let mut entry = AuditEntry::new(action, "user").resource_id(user_id.to_string());
    if let Some(actor) = ctx.user_id {
        entry = entry.actor(actor);
    }
    state.audit.emit(entry, audit_ctx);
}
