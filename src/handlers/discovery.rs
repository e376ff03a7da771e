//! OpenID Connect discovery and JWKS endpoints.

use axum::{extract::State, Json};

use crate::config::AppState;
use crate::dto::oauth::OpenIdConfiguration;
use crate::error::OAuthError;
use crate::repositories::ScopeRepository;
use crate::utils::jwt::JwkSet;

/// GET /.well-known/openid-configuration
pub async fn openid_configuration_handler(
    State(state): State<AppState>,
) -> Result<Json<OpenIdConfiguration>, OAuthError> {
    let scopes = ScopeRepository::new(state.pool.clone())
        .list_public_names()
        .await?;

    Ok(Json(OpenIdConfiguration::new(
        state.jwt_manager.issuer(),
        scopes,
    )))
}

/// GET /jwks - the verification keys in JWK form
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.jwt_manager.jwks().clone())
}
