//! OpenID Connect UserInfo endpoint.

use axum::{extract::State, Extension, Json};

use crate::config::AppState;
use crate::dto::oauth::UserInfoResponse;
use crate::error::AuthError;
use crate::middleware::AuthContext;
use crate::repositories::UserRepository;

/// GET /userinfo - claims about the token's subject, filtered by scope
///
/// Runs behind bearer authentication. `sub` is always present; `profile`
/// adds username and display name, `email` adds the address and its
/// verification state.
pub async fn userinfo_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<UserInfoResponse>, AuthError> {
    if !ctx.has_scope("openid") {
        return Err(AuthError::InvalidToken);
    }
    let user_id = ctx.user_id.ok_or(AuthError::InvalidToken)?;

    let user = UserRepository::new(state.pool.clone())
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::InvalidToken)?;

    let mut response = UserInfoResponse {
        sub: user.id.to_string(),
        preferred_username: None,
        name: None,
        email: None,
        email_verified: None,
    };

    if ctx.has_scope("profile") {
        response.preferred_username = Some(user.username.clone());
        response.name = user.display_name.clone();
    }
    if ctx.has_scope("email") {
        response.email = user.email.clone();
        response.email_verified = Some(user.email_verified);
    }

    Ok(Json(response))
}
