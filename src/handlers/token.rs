//! Back-channel endpoints: token, introspection, revocation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Form, Json,
};

use crate::config::AppState;
use crate::dto::oauth::{IntrospectRequest, IntrospectionResponse, RevokeRequest, TokenRequest, TokenResponse};
use crate::error::OAuthError;
use crate::middleware::{audit_context, check_rate_limit};
use crate::models::AuditAction;
use crate::services::audit::AuditEntry;
use crate::services::{extract_credentials, ClientAuthService, ClientCredentials, TokenService, TokenTtls};

fn token_service(state: &AppState) -> TokenService {
    TokenService::new(
        state.pool.clone(),
        state.jwt_manager.clone(),
        state.audit.clone(),
        TokenTtls {
            access_secs: state.config.access_token_ttl_secs,
            refresh_secs: state.config.refresh_token_ttl_secs,
            id_secs: state.config.id_token_ttl_secs,
        },
    )
}

/// POST /token - token endpoint
///
/// Authenticates the client (Basic, then body, then bare client_id for
/// public clients) and dispatches on the grant type.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let audit_ctx = audit_context(&headers);

    let credentials = extract_credentials(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;
    check_rate_limit(&state, credentials.client_id(), &audit_ctx)?;

    let client_auth = ClientAuthService::new(state.pool.clone());
    let client = client_auth.authenticate(&credentials).await?;

    let grant = request.grant()?;

    let response = token_service(&state)
        .grant(&client, grant, &audit_ctx)
        .await?;

    Ok(Json(response))
}

/// POST /introspect - token introspection (RFC 7662)
///
/// Requires an authenticated confidential client. Returns 200 with
/// `active: false` for every kind of dead or unknown token; the cause is
/// never disclosed.
pub async fn introspect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<IntrospectRequest>,
) -> Result<Json<IntrospectionResponse>, OAuthError> {
    let audit_ctx = audit_context(&headers);

    let credentials = extract_credentials(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;
    // Introspection is for resource servers; a bare client_id is not
    // authentication.
    if matches!(credentials, ClientCredentials::None { .. }) {
        return Err(OAuthError::InvalidClient { basic: false });
    }

    let client_auth = ClientAuthService::new(state.pool.clone());
    let client = client_auth.authenticate(&credentials).await?;

    let response = token_service(&state)
        .introspect(&request.token)
        .await;

    state.audit.emit(
        AuditEntry::new(AuditAction::TokenIntrospected, "token")
            .resource_id(client.client_id.clone())
            .metadata(serde_json::json!({ "active": response.active })),
        &audit_ctx,
    );

    Ok(Json(response))
}

/// POST /revoke - token revocation (RFC 7009)
///
/// Idempotent: returns 200 whether or not the token existed. Only the
/// owning client's tokens are affected.
pub async fn revoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<RevokeRequest>,
) -> Result<StatusCode, OAuthError> {
    let audit_ctx = audit_context(&headers);

    let credentials = extract_credentials(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;

    let client_auth = ClientAuthService::new(state.pool.clone());
    let client = client_auth.authenticate(&credentials).await?;

    token_service(&state)
        .revoke(
            &client,
            &request.token,
            request.token_type_hint.as_deref(),
            &audit_ctx,
        )
        .await?;

    Ok(StatusCode::OK)
}
