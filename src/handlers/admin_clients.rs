//! Admin management of OAuth clients and scopes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::admin::{
    ClientCreatedResponse, CreateClientRequest, CreateScopeRequest, ListQuery,
    SecretRegeneratedResponse, UpdateClientRequest, UpdateScopeRequest,
};
use crate::dto::{ApiResponse, Paged};
use crate::error::ApiError;
use crate::middleware::{audit_context, require_permissions, AuthContext};
use crate::models::{AuditAction, Client, ClientType, Scope, TokenEndpointAuthMethod};
use crate::models::scope::is_valid_scope_name;
use crate::repositories::{ClientRepository, NewClient, ScopeRepository};
use crate::services::audit::AuditEntry;
use crate::utils::password::hash_password;
use crate::utils::token::generate_credential;

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
// Clients
// ============================================================================

/// GET /admin/clients
pub async fn list_clients_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<Client>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["clients:read"], &audit_ctx)?;

    let (clients, total) = ClientRepository::new(state.pool.clone())
        .list(query.limit(), query.offset())
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: clients,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// POST /admin/clients - register a client
///
/// Confidential clients get a generated secret, returned exactly once.
/// Public clients are forced onto PKCE with auth method `none`.
pub async fn create_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ClientCreatedResponse>>), ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["clients:write"], &audit_ctx)?;

    if request.redirect_uris.is_empty() && request.grant_types.iter().any(|g| g == "authorization_code") {
        return Err(ApiError::Validation(
            "authorization_code clients need at least one redirect URI".to_string(),
        ));
    }

    let (secret, secret_hash, auth_method) = match request.client_type {
        ClientType::Public => {
            if matches!(
                request.token_endpoint_auth_method,
                Some(m) if m != TokenEndpointAuthMethod::None
            ) {
                return Err(ApiError::Validation(
                    "public clients must use token_endpoint_auth_method=none".to_string(),
                ));
            }
            (None, None, TokenEndpointAuthMethod::None)
        }
        ClientType::Confidential => {
            let secret = generate_credential();
            let hash = hash_password(&secret)?;
            (
                Some(secret),
                Some(hash),
                request
                    .token_endpoint_auth_method
                    .unwrap_or(TokenEndpointAuthMethod::ClientSecretBasic),
            )
        }
    };

    let client = ClientRepository::new(state.pool.clone())
        .create(NewClient {
            client_id: generate_credential(),
            client_secret_hash: secret_hash,
            name: request.name,
            client_type: request.client_type,
            redirect_uris: request.redirect_uris,
            allowed_scopes: request.allowed_scopes,
            grant_types: request.grant_types,
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: auth_method,
            // PKCE cannot be opted out of by public clients.
            require_pkce: request.client_type == ClientType::Public
                || request.require_pkce.unwrap_or(true),
            require_consent: request.require_consent.unwrap_or(true),
            allow_refresh_tokens: request.allow_refresh_tokens,
            access_token_ttl_secs: request.access_token_ttl_secs,
            refresh_token_ttl_secs: request.refresh_token_ttl_secs,
            authorization_code_ttl_secs: request.authorization_code_ttl_secs,
        })
        .await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ClientCreated,
        "client",
        client.client_id.clone(),
        &audit_ctx,
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ClientCreatedResponse {
            client,
            client_secret: secret,
        })),
    ))
}

/// PUT /admin/clients/:id
pub async fn update_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<ApiResponse<Client>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["clients:write"], &audit_ctx)?;

    let clients = ClientRepository::new(state.pool.clone());
    if !clients
        .update_policy(
            id,
            &request.name,
            &request.redirect_uris,
            &request.allowed_scopes,
            &request.grant_types,
            request.require_consent,
            request.allow_refresh_tokens,
            request.access_token_ttl_secs,
            request.refresh_token_ttl_secs,
        )
        .await?
    {
        return Err(ApiError::NotFound("client"));
    }

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ClientUpdated,
        "client",
        id.to_string(),
        &audit_ctx,
    );

    let client = clients
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("client"))?;
    Ok(Json(ApiResponse::ok(client)))
}

/// POST /admin/clients/:id/secret - rotate the client secret
pub async fn regenerate_secret_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SecretRegeneratedResponse>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["clients:write"], &audit_ctx)?;

    let clients = ClientRepository::new(state.pool.clone());
    let client = clients
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("client"))?;
    if client.is_public() {
        return Err(ApiError::Validation(
            "public clients have no secret".to_string(),
        ));
    }

    let secret = generate_credential();
    clients.update_secret_hash(id, &hash_password(&secret)?).await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ClientSecretRegenerated,
        "client",
        client.client_id.clone(),
        &audit_ctx,
    );

    Ok(Json(ApiResponse::ok(SecretRegeneratedResponse {
        client_id: client.client_id,
        client_secret: secret,
    })))
}

/// DELETE /admin/clients/:id
///
/// Refused while non-revoked tokens are outstanding.
pub async fn delete_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["clients:write"], &audit_ctx)?;

    let clients = ClientRepository::new(state.pool.clone());
    if clients.count_outstanding_tokens(id).await? > 0 {
        return Err(ApiError::Conflict(
            "client still has outstanding tokens".to_string(),
        ));
    }

    if !clients.delete(id).await? {
        return Err(ApiError::NotFound("client"));
    }

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ClientDeleted,
        "client",
        id.to_string(),
        &audit_ctx,
    );

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Scopes
// ============================================================================

/// GET /admin/scopes
pub async fn list_scopes_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<Scope>>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["scopes:read"], &audit_ctx)?;

    let (scopes, total) = ScopeRepository::new(state.pool.clone())
        .list(query.limit(), query.offset())
        .await?;

    Ok(Json(ApiResponse::ok(Paged {
        items: scopes,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })))
}

/// POST /admin/scopes
pub async fn create_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CreateScopeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Scope>>), ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["scopes:write"], &audit_ctx)?;

    if !is_valid_scope_name(&request.name) {
        return Err(ApiError::Validation(
            "scope names may contain letters, digits, '_', ':' and '-'".to_string(),
        ));
    }

    let scopes = ScopeRepository::new(state.pool.clone());
    if scopes.find_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict("scope name already exists".to_string()));
    }

    let scope = scopes
        .create(&request.name, request.description.as_deref(), request.is_public)
        .await?;

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ScopeCreated,
        "scope",
        scope.name.clone(),
        &audit_ctx,
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(scope))))
}

/// PUT /admin/scopes/:id
pub async fn update_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateScopeRequest>,
) -> Result<Json<ApiResponse<Scope>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    require_permissions(&state, &ctx, &["scopes:write"], &audit_ctx)?;

    let scopes = ScopeRepository::new(state.pool.clone());
    if !scopes
        .update(
            id,
            request.description.as_deref(),
            request.is_public,
            request.is_active,
        )
        .await?
    {
        return Err(ApiError::NotFound("scope"));
    }

    audit_mutation(
        &state,
        &ctx,
        AuditAction::ScopeUpdated,
        "scope",
        id.to_string(),
        &audit_ctx,
    );

    let scope = scopes.find_by_id(id).await?.ok_or(ApiError::NotFound("scope"))?;
    Ok(Json(ApiResponse::ok(scope)))
}
