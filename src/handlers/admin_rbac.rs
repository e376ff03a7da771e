//! Admin management of roles and permissions, plus the audit-log view.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::admin::{
    CreatePermissionRequest, CreateRoleRequest, ListQuery, UpdatePermissionRequest,
    UpdateRoleRequest,
};
use crate::dto::{ApiResponse, Paged};
use crate::error::ApiError;
use crate::middleware::{audit_context, require_permissions, AuthContext};
use crate::models::permission::is_valid_permission_name;
use crate::models::{AuditAction, AuditEvent, Permission, Role};
use crate::repositories::{
    AuditEventRepository, AuditFilter, PermissionRepository, RolePermissionRepository,
    RoleRepository, UserRoleRepository,
};
use crate::services::audit::AuditEntry;

fn audit_mutation(
    state: &AppState,
    ctx: &AuthContext,
    action: AuditAction,
    resource: &'static str,
    resource_id: String,
    audit_ctx: &crate::services::AuditContext,
) {
    let mut entry = AuditEntry::new(action, resource).resource_id(resource_id);
    if let Some(actor) = ctx.user_id {
        entry = entry.actor(actor);
    }
    state.audit.emit(entry, audit_ctx);
}

// ============================================================================
// Roles
// ============================================================================

/// GET /admin/roles
pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<Role>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:read"], &audit_ctx)?;

    let (roles, total) = RoleRepository::new(state.pool.clone())
        .list(query.limit(), query.offset())
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: roles,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// POST /admin/roles
pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Role>>), ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:write"], &audit_ctx)?;

    let roles = RoleRepository::new(state.pool.clone());
    if roles.find_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict("role name already exists".to_string()));
    }

    let role = roles.create(&request.name, &request.display_name).await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::RoleCreated,
        "role",
        role.name.clone(),
        &audit_ctx,
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(role))))
}

/// PUT /admin/roles/:id
///
/// `SYSTEM_ADMIN` cannot be deactivated.
pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<Role>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:write"], &audit_ctx)?;

    let roles = RoleRepository::new(state.pool.clone());
    let role = roles.find_by_id(id).await?.ok_or(ApiError::NotFound("role"))?;

    if role.is_system_admin() && !request.is_active {
        return Err(ApiError::Conflict(
            "the SYSTEM_ADMIN role cannot be deactivated".to_string(),
        ));
    }

    roles
        .update(id, &request.display_name, request.is_active)
        .await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::RoleUpdated,
        "role",
        role.name.clone(),
        &audit_ctx,
    );

    let role = roles.find_by_id(id).await?.ok_or(ApiError::NotFound("role"))?;
    Ok(Json(ApiResponse::ok(role)))
}

/// DELETE /admin/roles/:id
///
/// Reserved roles cannot be deleted; a role still held by users cannot
/// be deleted either.
pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:write"], &audit_ctx)?;

    let roles = RoleRepository::new(state.pool.clone());
    let role = roles.find_by_id(id).await?.ok_or(ApiError::NotFound("role"))?;

    if role.is_reserved() {
        return Err(ApiError::Conflict(format!(
            "the {} role is reserved and cannot be deleted",
            role.name
        )));
    }
    if UserRoleRepository::new(state.pool.clone())
        .role_in_use(id)
        .await?
    {
        return Err(ApiError::Conflict(
            "role is still assigned to users".to_string(),
        ));
    }

    roles.delete(id).await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::RoleDeleted,
        "role",
        role.name.clone(),
        &audit_ctx,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/roles/:id/permissions
pub async fn list_role_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Permission>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["roles:read", "permissions:read"], &audit_ctx)?;

    let permissions = RolePermissionRepository::new(state.pool.clone())
        .list_for_role(id)
        .await?;

    Ok(Json(ApiResponse::ok(permissions)))
}

/// POST /admin/roles/:id/permissions/:permission_id
pub async fn assign_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["permissions:write"], &audit_ctx)?;

    let role = RoleRepository::new(state.pool.clone())
        .find_by_id(role_id)
        .await?
        .ok_or(ApiError::NotFound("role"))?;
    let permission = PermissionRepository::new(state.pool.clone())
        .find_by_id(permission_id)
        .await?
        .ok_or(ApiError::NotFound("permission"))?;

    RolePermissionRepository::new(state.pool.clone())
        .assign(role_id, permission_id)
        .await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::PermissionAssigned,
        "role",
        format!("{}:{}", role.name, permission.name),
        &audit_ctx,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/roles/:id/permissions/:permission_id
pub async fn remove_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["permissions:write"], &audit_ctx)?;

    if !RolePermissionRepository::new(state.pool.clone())
        .remove(role_id, permission_id)
        .await?
    {
        return Err(ApiError::NotFound("permission assignment"));
    }

    audit_mutation(
        &state,
        &ctx,
        AuditAction::PermissionRemoved,
        "role",
        format!("{}:{}", role_id, permission_id),
        &audit_ctx,
    );

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Permissions
// ============================================================================

/// GET /admin/permissions
pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<Permission>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["permissions:read"], &audit_ctx)?;

    let (permissions, total) = PermissionRepository::new(state.pool.clone())
        .list(query.limit(), query.offset())
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: permissions,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// POST /admin/permissions
pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Permission>>), ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["permissions:write"], &audit_ctx)?;

    if !is_valid_permission_name(&request.name) {
        return Err(ApiError::Validation(
            "permission names have the form resource:action".to_string(),
        ));
    }

    let permissions = PermissionRepository::new(state.pool.clone());
    if permissions.find_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict(
            "permission name already exists".to_string(),
        ));
    }

    let permission = permissions
        .create(
            &request.name,
            request.permission_type,
            request.http_method.as_deref(),
            request.endpoint.as_deref(),
            request.menu_id.as_deref(),
        )
        .await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::PermissionCreated,
        "permission",
        permission.name.clone(),
        &audit_ctx,
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(permission))))
}

/// PUT /admin/permissions/:id
///
/// Name and type are immutable; only the details and activity change.
pub async fn update_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePermissionRequest>,
) -> Result<Json<ApiResponse<Permission>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["permissions:write"], &audit_ctx)?;

    let permissions = PermissionRepository::new(state.pool.clone());
    if !permissions
        .update(
            id,
            request.http_method.as_deref(),
            request.endpoint.as_deref(),
            request.menu_id.as_deref(),
            request.is_active,
        )
        .await?
    {
        return Err(ApiError::NotFound("permission"));
    }

    audit_mutation(
        &state,
        &ctx,
        AuditAction::PermissionUpdated,
        "permission",
        id.to_string(),
        &audit_ctx,
    );

    let permission = permissions
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("permission"))?;
    Ok(Json(ApiResponse::ok(permission)))
}

// ============================================================================
// Audit log
// ============================================================================

/// GET /admin/audit-events
pub async fn list_audit_events_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<AuditEvent>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["audit:read"], &audit_ctx)?;

    let filter = AuditFilter {
        actor_id: None,
        action: query.action.clone(),
        since: None,
    };
    let (events, total) = AuditEventRepository::new(state.pool.clone())
        .list(query.limit(), query.offset(), &filter)
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: events,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}
