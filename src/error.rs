use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Storage-layer failure. Repositories return this; services convert it
/// into their own error domain via `From`, so the cause is logged once at
/// the boundary and never surfaced to callers.
#[derive(Debug, thiserror::Error)]
#[error("Database error: {0}")]
pub struct StoreError(#[from] pub sqlx::Error);

/// Protocol errors for the OAuth endpoints, mapped to RFC 6749 codes.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    /// Client authentication failed. `basic` records whether the client
    /// used HTTP Basic, which changes the WWW-Authenticate challenge.
    #[error("Client authentication failed")]
    InvalidClient { basic: bool },

    #[error("{0}")]
    InvalidGrant(String),

    #[error("Client is not authorized for this grant type")]
    UnauthorizedClient,

    #[error("Grant type not supported")]
    UnsupportedGrantType,

    #[error("{0}")]
    InvalidScope(String),

    #[error("The resource owner denied the request")]
    AccessDenied,

    #[error("Too many requests")]
    TemporarilyUnavailable,

    #[error("Internal server error")]
    ServerError(String),
}

impl OAuthError {
    /// The RFC 6749 error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient { .. } => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::TemporarilyUnavailable => "temporarily_unavailable",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// Human-readable description for the error envelope. Internal causes
    /// are replaced with a generic message.
    pub fn description(&self) -> String {
        match self {
            OAuthError::ServerError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(e: StoreError) -> Self {
        OAuthError::ServerError(e.to_string())
    }
}

impl From<AuthError> for OAuthError {
    fn from(e: AuthError) -> Self {
        OAuthError::ServerError(e.to_string())
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::ServerError(cause) = &self {
            tracing::error!(%cause, "oauth endpoint failure");
        }

        let status = match &self {
            OAuthError::InvalidClient { .. } => StatusCode::UNAUTHORIZED,
            OAuthError::AccessDenied => StatusCode::FORBIDDEN,
            OAuthError::TemporarilyUnavailable => StatusCode::TOO_MANY_REQUESTS,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.code(),
            "error_description": self.description(),
        }));

        match &self {
            OAuthError::InvalidClient { basic: true } => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"token\"")],
                body,
            )
                .into_response(),
            OAuthError::TemporarilyUnavailable => {
                (status, [(header::RETRY_AFTER, "60")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

/// Bearer-token authentication failures, surfaced as 401 with a
/// `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::InternalError(e.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::InternalError(cause) = &self {
            tracing::error!(%cause, "authentication failure");
            let body = Json(json!({
                "error": "server_error",
                "error_description": "Internal server error",
            }));
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }

        let body = Json(json!({
            "error": "invalid_token",
            "error_description": self.to_string(),
        }));

        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                "Bearer error=\"invalid_token\"",
            )],
            body,
        )
            .into_response()
    }
}

/// Error detail in the non-OAuth envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Errors for the non-OAuth API surface (admin, account, RBAC endpoints),
/// wrapped in `{success:false, error:{code, message, details?}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Too many requests")]
    RateLimited,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "insufficient_permissions"),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::InternalError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::InternalError(cause) = &self {
            tracing::error!(%cause, "request failure");
        }

        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::InternalError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": ErrorBody {
                code,
                message,
                details: None,
            },
        }));

        match &self {
            ApiError::RateLimited => {
                (status, [(header::RETRY_AFTER, "60")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(
            OAuthError::InvalidRequest("x".into()).code(),
            "invalid_request"
        );
        assert_eq!(
            OAuthError::InvalidClient { basic: false }.code(),
            "invalid_client"
        );
        assert_eq!(OAuthError::InvalidGrant("x".into()).code(), "invalid_grant");
        assert_eq!(
            OAuthError::UnsupportedGrantType.code(),
            "unsupported_grant_type"
        );
        assert_eq!(OAuthError::InvalidScope("x".into()).code(), "invalid_scope");
        assert_eq!(OAuthError::ServerError("x".into()).code(), "server_error");
    }

    #[test]
    fn test_server_error_description_is_generic() {
        let err = OAuthError::ServerError("connection refused to 10.0.0.3".into());
        assert_eq!(err.description(), "Internal server error");
    }

    #[test]
    fn test_invalid_credentials_message_is_neutral() {
        // The same message regardless of whether the user exists.
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
    }

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(
            ApiError::NotFound("role").status_and_code(),
            (StatusCode::NOT_FOUND, "not_found")
        );
        assert_eq!(
            ApiError::Forbidden.status_and_code(),
            (StatusCode::FORBIDDEN, "insufficient_permissions")
        );
        assert_eq!(
            ApiError::Conflict("role name already exists".into()).status_and_code(),
            (StatusCode::CONFLICT, "conflict")
        );
    }
}
