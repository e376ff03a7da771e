//! Authorization-code engine: the `/authorize` state machine from
//! parameter validation through consent to code issuance.
//!
//! Until the client and its redirect URI have been validated, errors are
//! surfaced directly (the handler renders JSON) rather than redirected,
//! so the endpoint can never be used as an open redirector. After that
//! point errors redirect back to the client with `state` echoed.

use sqlx::MySqlPool;

use crate::dto::oauth::AuthorizeParams;
use crate::error::OAuthError;
use crate::models::{AuditAction, Client, User};
use crate::repositories::AuthorizationCodeRepository;
use crate::services::audit::{AuditContext, AuditEntry, AuditService};
use crate::services::client_auth::ClientAuthService;
use crate::services::consent::ConsentService;
use crate::utils::pkce::{validate_code_challenge, PKCE_METHOD_S256};
use crate::utils::token::{generate_credential, hash_token};

/// Default and maximum authorization-code lifetime.
pub const MAX_CODE_TTL_SECS: i64 = 600;

/// Where the authorize state machine landed.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// No valid user session; send the browser to login and come back.
    LoginRequired,
    /// Consent does not cover the requested scopes yet.
    ConsentRequired {
        client: Client,
        scopes: Vec<String>,
    },
    /// Code minted; redirect with `code` and echoed `state`.
    Granted {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
}

/// Authorize failures split by whether the redirect URI was validated.
#[derive(Debug)]
pub enum AuthorizeError {
    /// Surfaced as JSON; the redirect target is not trustworthy.
    Direct(OAuthError),
    /// Surfaced as an error redirect with `state` echoed.
    Redirect {
        redirect_uri: String,
        error: OAuthError,
        state: Option<String>,
    },
}

/// Service implementing the authorization-code engine
#[derive(Clone)]
pub struct AuthorizeService {
    client_auth: ClientAuthService,
    codes: AuthorizationCodeRepository,
    consents: ConsentService,
    audit: AuditService,
}

impl AuthorizeService {
    pub fn new(pool: MySqlPool, audit: AuditService) -> Self {
        Self {
            client_auth: ClientAuthService::new(pool.clone()),
            codes: AuthorizationCodeRepository::new(pool.clone()),
            consents: ConsentService::new(pool),
            audit,
        }
    }

    /// Run the authorize state machine for a front-channel request.
    ///
    /// `user` is the browser session's user, when one exists; its absence
    /// short-circuits to `LoginRequired` after request validation, so a
    /// login round-trip never hides a malformed request.
    pub async fn begin(
        &self,
        params: &AuthorizeParams,
        user: Option<&User>,
        audit_ctx: &AuditContext,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        // Client and redirect URI first; nothing redirects before both
        // check out.
        let client_id = params
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| direct("client_id is required"))?;
        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| direct("redirect_uri is required"))?;

        let client = self
            .client_auth
            .clients()
            .find_active_by_client_id(client_id)
            .await
            .map_err(|e| AuthorizeError::Direct(e.into()))?
            .ok_or(AuthorizeError::Direct(OAuthError::InvalidClient {
                basic: false,
            }))?;

        if !client.has_redirect_uri(redirect_uri) {
            return Err(direct("redirect_uri is not registered for this client"));
        }

        // The redirect target is trusted from here on.
        let redirect = |error: OAuthError| AuthorizeError::Redirect {
            redirect_uri: redirect_uri.to_string(),
            error,
            state: params.state.clone(),
        };

        match params.response_type.as_deref() {
            None => {
                return Err(redirect(OAuthError::InvalidRequest(
                    "response_type is required".to_string(),
                )))
            }
            Some("code") => {}
            Some(_) => {
                return Err(redirect(OAuthError::InvalidRequest(
                    "Only response_type=code is supported".to_string(),
                )))
            }
        }
        if !client.allows_response_type("code") {
            return Err(redirect(OAuthError::UnauthorizedClient));
        }
        if !client.allows_grant_type("authorization_code") {
            return Err(redirect(OAuthError::UnauthorizedClient));
        }

        // PKCE per client policy: public clients always require it, and a
        // presented challenge is validated and bound regardless. Only
        // S256 is accepted.
        let code_challenge = match params.code_challenge.as_deref() {
            Some(challenge) if validate_code_challenge(challenge) => Some(challenge),
            Some(_) => {
                return Err(redirect(OAuthError::InvalidRequest(
                    "Malformed code_challenge".to_string(),
                )))
            }
            None if client.pkce_required() => {
                return Err(redirect(OAuthError::InvalidRequest(
                    "code_challenge is required".to_string(),
                )))
            }
            None => None,
        };
        if code_challenge.is_some() && params.challenge_method() != PKCE_METHOD_S256 {
            return Err(redirect(OAuthError::InvalidRequest(
                "code_challenge_method must be S256".to_string(),
            )));
        }

        let scopes = self
            .client_auth
            .resolve_scopes(&params.scopes(), &client)
            .await
            .map_err(|e| redirect(e))?;

        let Some(user) = user else {
            return Ok(AuthorizeOutcome::LoginRequired);
        };

        if client.require_consent {
            let covered = self
                .consents
                .covers(user.id, client.id, &scopes)
                .await
                .map_err(|e| redirect(e.into()))?;
            if !covered {
                return Ok(AuthorizeOutcome::ConsentRequired {
                    client,
                    scopes,
                });
            }
        }

        let code = self
            .issue_code(&client, user, redirect_uri, &scopes, params, audit_ctx)
            .await
            .map_err(|e| redirect(e))?;

        Ok(AuthorizeOutcome::Granted {
            redirect_uri: redirect_uri.to_string(),
            code,
            state: params.state.clone(),
        })
    }

    /// Record a consent decision and, when approved, continue the flow.
    pub async fn complete_consent(
        &self,
        params: &AuthorizeParams,
        user: &User,
        approved: bool,
        audit_ctx: &AuditContext,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        let client_id = params
            .client_id
            .as_deref()
            .ok_or_else(|| direct("client_id is required"))?;

        let client = self
            .client_auth
            .clients()
            .find_active_by_client_id(client_id)
            .await
            .map_err(|e| AuthorizeError::Direct(e.into()))?
            .ok_or(AuthorizeError::Direct(OAuthError::InvalidClient {
                basic: false,
            }))?;

        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .filter(|uri| client.has_redirect_uri(uri))
            .ok_or_else(|| direct("redirect_uri is not registered for this client"))?;

        if !approved {
            self.audit.emit(
                AuditEntry::new(AuditAction::ConsentDenied, "consent")
                    .actor(user.id)
                    .resource_id(client.client_id.clone()),
                audit_ctx,
            );
            return Err(AuthorizeError::Redirect {
                redirect_uri: redirect_uri.to_string(),
                error: OAuthError::AccessDenied,
                state: params.state.clone(),
            });
        }

        let scopes = self
            .client_auth
            .resolve_scopes(&params.scopes(), &client)
            .await
            .map_err(|error| AuthorizeError::Redirect {
                redirect_uri: redirect_uri.to_string(),
                error,
                state: params.state.clone(),
            })?;

        self.consents
            .grant(user.id, client.id, &scopes)
            .await
            .map_err(|e| AuthorizeError::Direct(e.into()))?;

        self.audit.emit(
            AuditEntry::new(AuditAction::ConsentGranted, "consent")
                .actor(user.id)
                .resource_id(client.client_id.clone())
                .metadata(serde_json::json!({ "scopes": scopes })),
            audit_ctx,
        );

        self.begin(params, Some(user), audit_ctx).await
    }

    async fn issue_code(
        &self,
        client: &Client,
        user: &User,
        redirect_uri: &str,
        scopes: &[String],
        params: &AuthorizeParams,
        audit_ctx: &AuditContext,
    ) -> Result<String, OAuthError> {
        let code = generate_credential();
        let ttl = client
            .authorization_code_ttl_secs
            .unwrap_or(MAX_CODE_TTL_SECS)
            .min(MAX_CODE_TTL_SECS);

        let code_challenge = params.code_challenge.as_deref();
        self.codes
            .create(
                &hash_token(&code),
                user.id,
                client.id,
                redirect_uri,
                &scopes.join(" "),
                code_challenge,
                code_challenge.map(|_| PKCE_METHOD_S256),
                params.nonce.as_deref(),
                ttl,
            )
            .await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::CodeIssued, "authorization_code")
                .actor(user.id)
                .resource_id(client.client_id.clone())
                .metadata(serde_json::json!({ "scopes": scopes })),
            audit_ctx,
        );

        Ok(code)
    }
}

fn direct(message: &str) -> AuthorizeError {
    AuthorizeError::Direct(OAuthError::InvalidRequest(message.to_string()))
}
