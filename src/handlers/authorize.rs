//! Front-channel authorization endpoint.

use axum::{
    extract::{OriginalUri, Query, State},
    http::header::COOKIE,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Json,
};

use crate::config::AppState;
use crate::dto::oauth::{AuthorizeParams, ConsentDecision};
use crate::error::ApiError;
use crate::middleware::audit_context;
use crate::services::{AuthorizeError, AuthorizeOutcome, AuthorizeService, SessionService};

fn authorize_service(state: &AppState) -> AuthorizeService {
    AuthorizeService::new(state.pool.clone(), state.audit.clone())
}

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(
        state.pool.clone(),
        state.config.session_ttl_secs,
        state.config.cookie_secure,
    )
}

/// GET /authorize - entry point of the authorization-code flow
///
/// Outcomes:
/// - no session: 302 to the login page with the full authorize URL
///   preserved in `return_to`
/// - consent missing: 302 to the consent page carrying the request
/// - granted: 302 to the client's redirect URI with `code` and `state`
///
/// Validation failures before the redirect URI is trusted come back as
/// JSON; after that they redirect with `error` and echoed `state`.
pub async fn authorize_handler(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let audit_ctx = audit_context(&headers);

    let cookie_header = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let user = match session_service(&state).authenticate(cookie_header).await {
        Ok(user) => user,
        Err(e) => return crate::error::OAuthError::from(e).into_response(),
    };

    let outcome = authorize_service(&state)
        .begin(&params, user.as_ref(), &audit_ctx)
        .await;

    match outcome {
        Ok(AuthorizeOutcome::Granted {
            redirect_uri,
            code,
            state: client_state,
        }) => success_redirect(&redirect_uri, &code, client_state.as_deref()),
        Ok(AuthorizeOutcome::LoginRequired) => {
            let login = format!(
                "{}?return_to={}",
                state.config.login_url,
                urlencoding::encode(&original_uri.to_string())
            );
            Redirect::temporary(&login).into_response()
        }
        Ok(AuthorizeOutcome::ConsentRequired { client, scopes }) => {
            let consent = format!(
                "{}?client_id={}&client_name={}&scope={}&redirect_uri={}{}{}{}",
                state.config.consent_url,
                urlencoding::encode(&client.client_id),
                urlencoding::encode(&client.name),
                urlencoding::encode(&scopes.join(" ")),
                urlencoding::encode(params.redirect_uri.as_deref().unwrap_or_default()),
                optional_param("state", params.state.as_deref()),
                optional_param("code_challenge", params.code_challenge.as_deref()),
                optional_param("nonce", params.nonce.as_deref()),
            );
            Redirect::temporary(&consent).into_response()
        }
        Err(error) => authorize_error_response(error),
    }
}

/// POST /authorize/consent - consent decision callback
///
/// Requires a live session; records the decision and finishes the flow.
pub async fn consent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(decision): Json<ConsentDecision>,
) -> Response {
    let audit_ctx = audit_context(&headers);

    let cookie_header = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let user = match session_service(&state).authenticate(cookie_header).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    let outcome = authorize_service(&state)
        .complete_consent(&decision.params, &user, decision.approved, &audit_ctx)
        .await;

    match outcome {
        Ok(AuthorizeOutcome::Granted {
            redirect_uri,
            code,
            state: client_state,
        }) => success_redirect(&redirect_uri, &code, client_state.as_deref()),
        // The decision was just recorded, so these are unreachable short
        // of a concurrent consent withdrawal; re-running the flow is the
        // safe answer.
        Ok(AuthorizeOutcome::ConsentRequired { .. }) | Ok(AuthorizeOutcome::LoginRequired) => {
            ApiError::Conflict("Authorization state changed; retry the request".to_string())
                .into_response()
        }
        Err(error) => authorize_error_response(error),
    }
}

fn success_redirect(redirect_uri: &str, code: &str, state: Option<&str>) -> Response {
    let mut url = format!(
        "{}{}code={}",
        redirect_uri,
        if redirect_uri.contains('?') { "&" } else { "?" },
        urlencoding::encode(code)
    );
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    Redirect::temporary(&url).into_response()
}

fn authorize_error_response(error: AuthorizeError) -> Response {
    match error {
        AuthorizeError::Direct(e) => e.into_response(),
        AuthorizeError::Redirect {
            redirect_uri,
            error,
            state,
        } => {
            let mut url = format!(
                "{}{}error={}&error_description={}",
                redirect_uri,
                if redirect_uri.contains('?') { "&" } else { "?" },
                urlencoding::encode(error.code()),
                urlencoding::encode(&error.description())
            );
            if let Some(state) = state {
                url.push_str(&format!("&state={}", urlencoding::encode(&state)));
            }
            Redirect::temporary(&url).into_response()
        }
    }
}

fn optional_param(name: &str, value: Option<&str>) -> String {
    value
        .map(|v| format!("&{}={}", name, urlencoding::encode(v)))
        .unwrap_or_default()
}
