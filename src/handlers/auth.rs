//! Login, registration and account-recovery endpoints.
//!
//! A successful login starts a cookie session for the front-channel
//! authorize flow. Recovery tokens are handed to the mail collaborator;
//! in development they are traced instead.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::config::AppState;
use crate::dto::auth::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest, VerifyEmailRequest, UserSummary,
};
use crate::dto::ApiResponse;
use crate::error::ApiError;
use crate::middleware::{audit_context, check_rate_limit_api, AuthContext};
use crate::models::AuditAction;
use crate::services::audit::AuditEntry;
use crate::services::{AccountPolicy, AccountService, SessionService};

fn account_service(state: &AppState) -> AccountService {
    AccountService::new(
        state.pool.clone(),
        AccountPolicy {
            password_policy: state.config.password_policy(),
            history_depth: state.config.password_history_depth,
            max_failed_logins: state.config.max_failed_logins,
            lockout_minutes: state.config.lockout_minutes,
            reset_token_ttl_secs: state.config.reset_token_ttl_secs,
        },
    )
}

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(
        state.pool.clone(),
        state.config.session_ttl_secs,
        state.config.cookie_secure,
    )
}

/// Hand a recovery token to the mail collaborator. Delivery is outside
/// the core; the token itself never enters logs in production builds.
fn deliver_token(kind: &str, email: &str, token: &str) {
    if cfg!(debug_assertions) {
        tracing::debug!(kind, email, token, "recovery token (dev delivery)");
    } else {
        tracing::info!(kind, email, "recovery token issued");
    }
}

/// POST /auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let audit_ctx = audit_context(&headers);
    check_rate_limit_api(&state, "auth:login", &audit_ctx)?;

    let result = account_service(&state)
        .authenticate(
            &request.username,
            &request.password,
            audit_ctx.ip_address.as_deref(),
            audit_ctx.user_agent.as_deref(),
        )
        .await;

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            state.audit.emit(
                AuditEntry::new(AuditAction::LoginFailed, "auth")
                    .failure()
                    .metadata(serde_json::json!({ "username": request.username })),
                &audit_ctx,
            );
            return Err(e);
        }
    };

    let sessions = session_service(&state);
    let (token, _session) = sessions
        .start(
            user.id,
            audit_ctx.ip_address.as_deref(),
            audit_ctx.user_agent.as_deref(),
        )
        .await?;

    state.audit.emit(
        AuditEntry::new(AuditAction::Login, "auth").actor(user.id),
        &audit_ctx,
    );

    let body = Json(ApiResponse::ok(UserSummary::from(&user)));
    Ok((
        [(header::SET_COOKIE, sessions.cookie(&token))],
        body,
    )
        .into_response())
}

/// POST /auth/logout
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let audit_ctx = audit_context(&headers);
    let sessions = session_service(&state);

    let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    if let Ok(Some(user)) = sessions.authenticate(cookie_header).await {
        state.audit.emit(
            AuditEntry::new(AuditAction::Logout, "auth").actor(user.id),
            &audit_ctx,
        );
    }
    sessions.end(cookie_header).await?;

    Ok((
        [(header::SET_COOKIE, sessions.clearing_cookie())],
        StatusCode::NO_CONTENT,
    )
        .into_response())
}

/// POST /auth/register - self-registration
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserSummary>>), ApiError> {
    let audit_ctx = audit_context(&headers);

    let (user, verification) = account_service(&state)
        .register(
            &request.username,
            request.email.as_deref(),
            &request.password,
            false,
        )
        .await?;

    if let (Some(email), Some(token)) = (user.email.as_deref(), verification.as_deref()) {
        deliver_token("email_verification", email, token);
    }

    state.audit.emit(
        AuditEntry::new(AuditAction::Register, "auth").actor(user.id),
        &audit_ctx,
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserSummary::from(&user))),
    ))
}

/// POST /auth/forgot-password
///
/// Always answers with the same neutral message, whether or not the
/// email matched an account.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    check_rate_limit_api(&state, "auth:forgot-password", &audit_ctx)?;

    if let Some(token) = account_service(&state).forgot_password(&request.email).await? {
        deliver_token("password_reset", &request.email, &token);
        state.audit.emit(
            AuditEntry::new(AuditAction::PasswordResetRequested, "auth"),
            &audit_ctx,
        );
    }

    Ok(Json(ApiResponse::ok(
        "If the address is registered, a reset link has been sent",
    )))
}

/// POST /auth/reset-password
pub async fn reset_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let audit_ctx = audit_context(&headers);

    let user = account_service(&state)
        .reset_password(&request.token, &request.new_password)
        .await?;

    // A reset invalidates existing browser sessions.
    crate::repositories::SessionRepository::new(state.pool.clone())
        .delete_for_user(user.id)
        .await?;

    state.audit.emit(
        AuditEntry::new(AuditAction::PasswordReset, "auth").actor(user.id),
        &audit_ctx,
    );

    Ok(Json(ApiResponse::ok("Password updated")))
}

/// POST /auth/verify-email
pub async fn verify_email_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let audit_ctx = audit_context(&headers);

    let user = account_service(&state).confirm_email(&request.token).await?;

    state.audit.emit(
        AuditEntry::new(AuditAction::EmailVerified, "auth").actor(user.id),
        &audit_ctx,
    );

    Ok(Json(ApiResponse::ok("Email verified")))
}

/// POST /auth/change-password - bearer-authenticated password change
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let audit_ctx = audit_context(&headers);
    let user_id = ctx.require_user()?;

    account_service(&state)
        .change_password(user_id, &request.current_password, &request.new_password)
        .await?;

    state.audit.emit(
        AuditEntry::new(AuditAction::PasswordChanged, "auth").actor(user_id),
        &audit_ctx,
    );

    Ok(Json(ApiResponse::ok("Password updated")))
}
