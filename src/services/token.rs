//! Token engine: grant dispatch, refresh rotation with replay
//! detection, introspection and revocation.
//!
//! Introspection follows a fixed pipeline: verify the JWT, check the
//! blacklist, check the stored record, check the user. The first failing
//! stage yields the uniform `active: false` answer.

use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::dto::oauth::{IntrospectionResponse, TokenGrant, TokenResponse};
use crate::error::OAuthError;
use crate::models::{AuditAction, Client, TokenKind, User};
use crate::repositories::{
    AccessTokenRepository, AuthorizationCodeRepository, BlacklistRepository,
    RefreshTokenRepository, UserRepository,
};
use crate::services::audit::{AuditContext, AuditEntry, AuditService};
use crate::services::client_auth::ClientAuthService;
use crate::services::rbac::RbacService;
use crate::utils::jwt::{ClaimsBuilder, IdTokenClaims, JwtManager, TokenClaims};
use crate::utils::pkce::{validate_code_verifier, verify_pkce};
use crate::utils::token::{hash_token, verify_token_hash};

/// Fallback lifetimes applied when a client carries no overrides.
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access_secs: i64,
    pub refresh_secs: i64,
    pub id_secs: i64,
}

/// Service implementing the token engine
#[derive(Clone)]
pub struct TokenService {
    jwt: JwtManager,
    client_auth: ClientAuthService,
    codes: AuthorizationCodeRepository,
    access_tokens: AccessTokenRepository,
    refresh_tokens: RefreshTokenRepository,
    blacklist: BlacklistRepository,
    users: UserRepository,
    rbac: RbacService,
    audit: AuditService,
    ttls: TokenTtls,
}

impl TokenService {
    pub fn new(pool: MySqlPool, jwt: JwtManager, audit: AuditService, ttls: TokenTtls) -> Self {
        Self {
            jwt,
            client_auth: ClientAuthService::new(pool.clone()),
            codes: AuthorizationCodeRepository::new(pool.clone()),
            access_tokens: AccessTokenRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool.clone()),
            blacklist: BlacklistRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            rbac: RbacService::new(pool),
            audit,
            ttls,
        }
    }

    /// Dispatch an authenticated token request on its grant type.
    pub async fn grant(
        &self,
        client: &Client,
        grant: TokenGrant,
        audit_ctx: &AuditContext,
    ) -> Result<TokenResponse, OAuthError> {
        match grant {
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                self.authorization_code_grant(
                    client,
                    &code,
                    &redirect_uri,
                    code_verifier.as_deref(),
                    audit_ctx,
                )
                .await
            }
            TokenGrant::RefreshToken {
                refresh_token,
                scopes,
            } => self.refresh_grant(client, &refresh_token, &scopes, audit_ctx).await,
            TokenGrant::ClientCredentials { scopes } => {
                self.client_credentials_grant(client, &scopes, audit_ctx).await
            }
        }
    }

    // ========================================================================
    // authorization_code
    // ========================================================================

    async fn authorization_code_grant(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        audit_ctx: &AuditContext,
    ) -> Result<TokenResponse, OAuthError> {
        if !client.allows_grant_type("authorization_code") {
            return Err(OAuthError::UnauthorizedClient);
        }

        // Atomic load-and-consume; a second redemption of the same code
        // sees None here.
        let auth_code = self
            .codes
            .consume(&hash_token(code))
            .await?
            .ok_or_else(|| invalid_grant("Authorization code is invalid, expired or consumed"))?;

        if auth_code.client_id != client.id {
            return Err(invalid_grant("Authorization code was issued to another client"));
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(invalid_grant("redirect_uri does not match the authorization request"));
        }

        // The verifier must match the challenge bound at authorization;
        // a code issued without PKCE accepts no verifier at all.
        match (auth_code.code_challenge.as_deref(), code_verifier) {
            (Some(challenge), Some(verifier)) => {
                if !validate_code_verifier(verifier) {
                    return Err(invalid_grant("Malformed code_verifier"));
                }
                if !verify_pkce(verifier, challenge) {
                    return Err(invalid_grant("code_verifier does not match code_challenge"));
                }
            }
            (Some(_), None) => {
                return Err(invalid_grant("code_verifier is required"));
            }
            (None, Some(_)) => {
                return Err(invalid_grant(
                    "Authorization code was issued without a code_challenge",
                ));
            }
            (None, None) => {}
        }

        let user = self
            .users
            .find_by_id(auth_code.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| invalid_grant("User is no longer available"))?;

        let scopes = auth_code.scopes();
        let with_refresh = client.allow_refresh_tokens && client.allows_grant_type("refresh_token");
        let response = self
            .issue_user_tokens(
                client,
                &user,
                &scopes,
                with_refresh,
                auth_code.nonce.as_deref(),
                auth_code.created_at.timestamp(),
            )
            .await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::TokenIssued, "token")
                .actor(user.id)
                .resource_id(client.client_id.clone())
                .metadata(serde_json::json!({
                    "grant_type": "authorization_code",
                    "scopes": scopes,
                })),
            audit_ctx,
        );

        Ok(response)
    }

    // ========================================================================
    // refresh_token
    // ========================================================================

    async fn refresh_grant(
        &self,
        client: &Client,
        refresh_token: &str,
        requested_scopes: &[String],
        audit_ctx: &AuditContext,
    ) -> Result<TokenResponse, OAuthError> {
        if !client.allows_grant_type("refresh_token") {
            return Err(OAuthError::UnauthorizedClient);
        }

        let claims = self
            .jwt
            .verify_refresh_token(refresh_token)
            .map_err(|_| invalid_grant("Invalid refresh token"))?;

        if claims.client_id != client.client_id {
            return Err(invalid_grant("Refresh token was issued to another client"));
        }

        // A blacklisted jti is a replay of a rotated or revoked token;
        // kill the whole chain for this user/client pair.
        if self.blacklist.contains(&claims.jti).await? {
            self.punish_replay(client, &claims, audit_ctx).await?;
            return Err(invalid_grant("Refresh token has been revoked"));
        }

        let record = self
            .refresh_tokens
            .find_by_jti(&claims.jti)
            .await?
            .filter(|r| verify_token_hash(refresh_token, &r.token_hash))
            .ok_or_else(|| invalid_grant("Unknown refresh token"))?;

        if record.is_revoked {
            self.punish_replay(client, &claims, audit_ctx).await?;
            return Err(invalid_grant("Refresh token has been revoked"));
        }
        if record.is_expired() {
            return Err(invalid_grant("Refresh token has expired"));
        }
        if record.client_id != client.id {
            return Err(invalid_grant("Refresh token was issued to another client"));
        }

        // Downscoping only: the request may narrow but never widen.
        let stored_scopes = record.scopes();
        let effective_scopes = if requested_scopes.is_empty() {
            stored_scopes.clone()
        } else {
            for scope in requested_scopes {
                if !stored_scopes.contains(scope) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope exceeds the refresh token's scope".to_string(),
                    ));
                }
            }
            requested_scopes.to_vec()
        };

        let user = match record.user_id {
            Some(user_id) => Some(
                self.users
                    .find_by_id(user_id)
                    .await?
                    .filter(|u| u.is_active)
                    .ok_or_else(|| invalid_grant("User is no longer available"))?,
            ),
            None => None,
        };

        // Rotate: the replacement keeps the full stored scope so a later
        // refresh can still use it.
        let refresh_ttl = client.refresh_token_ttl_secs.unwrap_or(self.ttls.refresh_secs);
        let subject = record
            .user_id
            .map(|u| u.to_string())
            .unwrap_or_else(|| client.client_id.clone());
        let (new_refresh, new_claims) = self.jwt.issue_refresh_token(
            ClaimsBuilder::new(subject, client.client_id.clone()).scope(&stored_scopes),
            refresh_ttl,
        )?;

        let rotated = self
            .refresh_tokens
            .rotate(
                &record.jti,
                record.expires_at,
                &new_claims.jti,
                &hash_token(&new_refresh),
                record.user_id,
                client.id,
                &record.scope,
                Utc::now() + Duration::seconds(refresh_ttl),
            )
            .await?;
        if !rotated {
            // A concurrent refresh won; this presentation is a replay.
            return Err(invalid_grant("Refresh token has been revoked"));
        }

        let access = self
            .issue_access_token(client, user.as_ref(), &effective_scopes)
            .await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::TokenRefreshed, "token")
                .resource_id(client.client_id.clone())
                .metadata(serde_json::json!({ "scopes": effective_scopes })),
            audit_ctx,
        );

        Ok(TokenResponse::new(
            access.token,
            access.expires_in,
            Some(new_refresh),
            None,
            &effective_scopes,
        ))
    }

    /// Replay of a dead refresh token: revoke every live token of the
    /// pair so a stolen rotation chain dies with it.
    async fn punish_replay(
        &self,
        client: &Client,
        claims: &TokenClaims,
        audit_ctx: &AuditContext,
    ) -> Result<(), OAuthError> {
        if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
            self.refresh_tokens
                .revoke_all_for_user_client(user_id, client.id)
                .await?;

            self.audit.emit(
                AuditEntry::new(AuditAction::TokenRevoked, "token")
                    .actor(user_id)
                    .resource_id(client.client_id.clone())
                    .failure()
                    .metadata(serde_json::json!({
                        "reason": "refresh_token_replay",
                        "cascade": true,
                    })),
                audit_ctx,
            );
        }
        Ok(())
    }

    // ========================================================================
    // client_credentials
    // ========================================================================

    async fn client_credentials_grant(
        &self,
        client: &Client,
        requested_scopes: &[String],
        audit_ctx: &AuditContext,
    ) -> Result<TokenResponse, OAuthError> {
        // Machine grant for confidential clients only; no user subject,
        // no refresh token.
        if client.is_public() {
            return Err(OAuthError::UnauthorizedClient);
        }
        if !client.allows_grant_type("client_credentials") {
            return Err(OAuthError::UnauthorizedClient);
        }

        let scopes = self
            .client_auth
            .resolve_scopes(requested_scopes, client)
            .await?;

        let access = self.issue_access_token(client, None, &scopes).await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::TokenIssued, "token")
                .resource_id(client.client_id.clone())
                .metadata(serde_json::json!({
                    "grant_type": "client_credentials",
                    "scopes": scopes,
                })),
            audit_ctx,
        );

        Ok(TokenResponse::new(
            access.token,
            access.expires_in,
            None,
            None,
            &scopes,
        ))
    }

    // ========================================================================
    // Introspection (RFC 7662)
    // ========================================================================

    /// Inspect a token for an authenticated resource server. Every
    /// failure mode collapses into `active: false`.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.introspect_inner(token).await {
            Ok(response) => response,
            Err(_) => IntrospectionResponse::inactive(),
        }
    }

    async fn introspect_inner(&self, token: &str) -> Result<IntrospectionResponse, OAuthError> {
        // Stage 1: signature and standard claims.
        let (claims, kind) = if let Ok(claims) = self.jwt.verify_access_token(token) {
            (claims, TokenKind::Access)
        } else if let Ok(claims) = self.jwt.verify_refresh_token(token) {
            (claims, TokenKind::Refresh)
        } else {
            return Ok(IntrospectionResponse::inactive());
        };

        // Stage 2: deny-list.
        if self.blacklist.contains(&claims.jti).await? {
            return Ok(IntrospectionResponse::inactive());
        }

        // Stage 3: the stored record.
        let user_id = match kind {
            TokenKind::Access => {
                let Some(record) = self.access_tokens.find_by_jti(&claims.jti).await? else {
                    return Ok(IntrospectionResponse::inactive());
                };
                if record.is_expired() || !verify_token_hash(token, &record.token_hash) {
                    return Ok(IntrospectionResponse::inactive());
                }
                record.user_id
            }
            TokenKind::Refresh => {
                let Some(record) = self.refresh_tokens.find_by_jti(&claims.jti).await? else {
                    return Ok(IntrospectionResponse::inactive());
                };
                if record.is_revoked
                    || record.is_expired()
                    || !verify_token_hash(token, &record.token_hash)
                {
                    return Ok(IntrospectionResponse::inactive());
                }
                record.user_id
            }
        };

        // Stage 4: any associated user must still be active.
        let username = match user_id {
            Some(user_id) => {
                let Some(user) = self.users.find_by_id(user_id).await?.filter(|u| u.is_active)
                else {
                    return Ok(IntrospectionResponse::inactive());
                };
                Some(user.username)
            }
            None => None,
        };

        Ok(IntrospectionResponse {
            active: true,
            client_id: Some(claims.client_id.clone()),
            username,
            scope: Some(claims.scope.clone()),
            token_type: Some(
                match kind {
                    TokenKind::Access => "Bearer",
                    TokenKind::Refresh => "refresh_token",
                }
                .to_string(),
            ),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            sub: Some(claims.sub.clone()),
            jti: Some(claims.jti.clone()),
            permissions: claims.permissions.clone(),
        })
    }

    // ========================================================================
    // Revocation (RFC 7009)
    // ========================================================================

    /// Revoke a token presented by its owning client. Idempotent; callers
    /// receive success whether or not the token existed, and a token
    /// belonging to another client is left untouched without comment.
    pub async fn revoke(
        &self,
        client: &Client,
        token: &str,
        token_type_hint: Option<&str>,
        audit_ctx: &AuditContext,
    ) -> Result<(), OAuthError> {
        let token_hash = hash_token(token);

        let try_refresh_first = token_type_hint == Some("refresh_token");
        if try_refresh_first {
            if self.revoke_refresh(client, &token_hash, audit_ctx).await? {
                return Ok(());
            }
            self.revoke_access(client, &token_hash, audit_ctx).await?;
        } else {
            if self.revoke_access(client, &token_hash, audit_ctx).await? {
                return Ok(());
            }
            self.revoke_refresh(client, &token_hash, audit_ctx).await?;
        }

        Ok(())
    }

    async fn revoke_access(
        &self,
        client: &Client,
        token_hash: &str,
        audit_ctx: &AuditContext,
    ) -> Result<bool, OAuthError> {
        let Some(record) = self.access_tokens.find_by_token_hash(token_hash).await? else {
            return Ok(false);
        };
        if record.client_id != client.id {
            // Not this client's token; swallow silently per RFC 7009.
            return Ok(true);
        }

        self.blacklist
            .add(&record.jti, TokenKind::Access, record.expires_at)
            .await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::TokenRevoked, "token")
                .resource_id(record.jti.clone())
                .metadata(serde_json::json!({ "token_type": "access" })),
            audit_ctx,
        );

        Ok(true)
    }

    async fn revoke_refresh(
        &self,
        client: &Client,
        token_hash: &str,
        audit_ctx: &AuditContext,
    ) -> Result<bool, OAuthError> {
        let Some(record) = self.refresh_tokens.find_by_token_hash(token_hash).await? else {
            return Ok(false);
        };
        if record.client_id != client.id {
            return Ok(true);
        }

        // Revoking a refresh token takes down the access tokens issued
        // alongside it.
        self.refresh_tokens.revoke_with_cascade(&record).await?;

        self.audit.emit(
            AuditEntry::new(AuditAction::TokenRevoked, "token")
                .resource_id(record.jti.clone())
                .metadata(serde_json::json!({
                    "token_type": "refresh",
                    "cascade": true,
                })),
            audit_ctx,
        );

        Ok(true)
    }

    // ========================================================================
    // Minting helpers
    // ========================================================================

    /// Issue the token set for a completed authorization: access token,
    /// optional refresh token, optional ID token.
    async fn issue_user_tokens(
        &self,
        client: &Client,
        user: &User,
        scopes: &[String],
        with_refresh: bool,
        nonce: Option<&str>,
        auth_time: i64,
    ) -> Result<TokenResponse, OAuthError> {
        let access = self.issue_access_token(client, Some(user), scopes).await?;

        let refresh_token = if with_refresh {
            let refresh_ttl = client.refresh_token_ttl_secs.unwrap_or(self.ttls.refresh_secs);
            let (token, claims) = self.jwt.issue_refresh_token(
                ClaimsBuilder::new(user.id.to_string(), client.client_id.clone()).scope(scopes),
                refresh_ttl,
            )?;
            self.refresh_tokens
                .create(
                    &claims.jti,
                    &hash_token(&token),
                    Some(user.id),
                    client.id,
                    &scopes.join(" "),
                    Utc::now() + Duration::seconds(refresh_ttl),
                )
                .await?;
            Some(token)
        } else {
            None
        };

        let id_token = if scopes.iter().any(|s| s == "openid") {
            let claims = IdTokenClaims {
                iss: String::new(),
                aud: client.client_id.clone(),
                sub: user.id.to_string(),
                iat: 0,
                exp: 0,
                auth_time,
                azp: client.client_id.clone(),
                nonce: nonce.map(String::from),
                email: scopes
                    .iter()
                    .any(|s| s == "email")
                    .then(|| user.email.clone())
                    .flatten(),
                email_verified: scopes
                    .iter()
                    .any(|s| s == "email")
                    .then_some(user.email_verified),
            };
            Some(self.jwt.issue_id_token(claims, self.ttls.id_secs)?)
        } else {
            None
        };

        Ok(TokenResponse::new(
            access.token,
            access.expires_in,
            refresh_token,
            id_token,
            scopes,
        ))
    }

    /// Mint and record a single access token.
    async fn issue_access_token(
        &self,
        client: &Client,
        user: Option<&User>,
        scopes: &[String],
    ) -> Result<IssuedAccessToken, OAuthError> {
        let ttl = client.access_token_ttl_secs.unwrap_or(self.ttls.access_secs);

        let builder = match user {
            Some(user) => {
                let permissions = self
                    .rbac
                    .permission_names(user.id)
                    .await
                    .map_err(|_| OAuthError::ServerError("permission resolution failed".to_string()))?;
                let mut permissions: Vec<String> = permissions.into_iter().collect();
                permissions.sort();
                ClaimsBuilder::new(user.id.to_string(), client.client_id.clone())
                    .scope(scopes)
                    .username(user.username.clone())
                    .permissions(permissions)
            }
            None => ClaimsBuilder::new(client.client_id.clone(), client.client_id.clone())
                .scope(scopes),
        };

        let (token, claims) = self.jwt.issue_access_token(builder, ttl)?;

        self.access_tokens
            .create(
                &claims.jti,
                &hash_token(&token),
                user.map(|u| u.id),
                client.id,
                &claims.scope,
                Utc::now() + Duration::seconds(ttl),
            )
            .await?;

        Ok(IssuedAccessToken {
            token,
            expires_in: ttl,
        })
    }
}

struct IssuedAccessToken {
    token: String,
    expires_in: i64,
}

fn invalid_grant(message: &str) -> OAuthError {
    OAuthError::InvalidGrant(message.to_string())
}
