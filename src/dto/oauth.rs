//! Wire types for the OAuth2/OpenID Connect endpoints, per RFC 6749,
//! RFC 7009, RFC 7636 and RFC 7662.

use serde::{Deserialize, Serialize};

use crate::error::OAuthError;
use crate::utils::pkce::PKCE_METHOD_S256;

// ============================================================================
// Authorization endpoint
// ============================================================================

/// Query parameters of `GET /authorize`. Everything is optional at the
/// wire level; the engine decides which absences are fatal and how to
/// surface them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

impl AuthorizeParams {
    /// Requested scopes, split on whitespace.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// The effective challenge method; absent means S256.
    pub fn challenge_method(&self) -> &str {
        self.code_challenge_method
            .as_deref()
            .unwrap_or(PKCE_METHOD_S256)
    }
}

/// Body of the consent decision callback.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentDecision {
    pub approved: bool,
    #[serde(flatten)]
    pub params: AuthorizeParams,
}

// ============================================================================
// Token endpoint
// ============================================================================

/// Raw form body of `POST /token`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl TokenRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Narrow the open form into the typed request for its grant,
    /// rejecting missing parameters up front.
    pub fn grant(&self) -> Result<TokenGrant, OAuthError> {
        let missing =
            |name: &str| OAuthError::InvalidRequest(format!("{} is required", name));

        match self.grant_type.as_deref() {
            // Whether a code_verifier is required depends on the code the
            // client redeems; the engine decides once it has loaded it.
            Some("authorization_code") => Ok(TokenGrant::AuthorizationCode {
                code: self.code.clone().ok_or_else(|| missing("code"))?,
                redirect_uri: self
                    .redirect_uri
                    .clone()
                    .ok_or_else(|| missing("redirect_uri"))?,
                code_verifier: self.code_verifier.clone(),
            }),
            Some("refresh_token") => Ok(TokenGrant::RefreshToken {
                refresh_token: self
                    .refresh_token
                    .clone()
                    .ok_or_else(|| missing("refresh_token"))?,
                scopes: self.scopes(),
            }),
            Some("client_credentials") => Ok(TokenGrant::ClientCredentials {
                scopes: self.scopes(),
            }),
            Some(_) => Err(OAuthError::UnsupportedGrantType),
            None => Err(missing("grant_type")),
        }
    }
}

/// One variant per supported grant type; the token engine dispatches on
/// this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
        scopes: Vec<String>,
    },
    ClientCredentials {
        scopes: Vec<String>,
    },
}

/// Success body of `POST /token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    pub fn new(
        access_token: String,
        expires_in: i64,
        refresh_token: Option<String>,
        id_token: Option<String>,
        scopes: &[String],
    ) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token,
            id_token,
            scope: scopes.join(" "),
        }
    }
}

// ============================================================================
// Introspection and revocation
// ============================================================================

/// Form body of `POST /introspect` (RFC 7662).
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Introspection result. On any failure the response is `active: false`
/// with every other field absent; no cause is ever leaked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl IntrospectionResponse {
    /// The uniform negative answer.
    pub fn inactive() -> Self {
        Self {
            active: false,
            client_id: None,
            username: None,
            scope: None,
            token_type: None,
            exp: None,
            iat: None,
            sub: None,
            jti: None,
            permissions: None,
        }
    }
}

/// Form body of `POST /revoke` (RFC 7009).
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

// ============================================================================
// UserInfo and discovery
// ============================================================================

/// `GET /userinfo` response, filtered by the token's scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

/// `GET /.well-known/openid-configuration` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn new(issuer: &str, scopes_supported: Vec<String>) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/authorize", base),
            token_endpoint: format!("{}/token", base),
            userinfo_endpoint: format!("{}/userinfo", base),
            revocation_endpoint: format!("{}/revoke", base),
            introspection_endpoint: format!("{}/introspect", base),
            jwks_uri: format!("{}/jwks", base),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
            ],
            scopes_supported,
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            code_challenge_methods_supported: vec![PKCE_METHOD_S256.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_dispatch_authorization_code() {
        let request = TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some("abc".to_string()),
            redirect_uri: Some("https://app/cb".to_string()),
            code_verifier: Some("v".repeat(43)),
            ..Default::default()
        };

        match request.grant().unwrap() {
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                assert_eq!(code, "abc");
                assert_eq!(redirect_uri, "https://app/cb");
                assert_eq!(code_verifier.map(|v| v.len()), Some(43));
            }
            other => panic!("wrong grant: {:?}", other),
        }
    }

    #[test]
    fn test_grant_missing_parameters() {
        let request = TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            request.grant(),
            Err(OAuthError::InvalidRequest(_))
        ));

        let request = TokenRequest {
            grant_type: Some("refresh_token".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            request.grant(),
            Err(OAuthError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_authorization_code_grant_without_verifier_parses() {
        // The verifier requirement is tied to the redeemed code, so the
        // form itself accepts its absence.
        let request = TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some("abc".to_string()),
            redirect_uri: Some("https://app/cb".to_string()),
            ..Default::default()
        };

        match request.grant().unwrap() {
            TokenGrant::AuthorizationCode { code_verifier, .. } => {
                assert!(code_verifier.is_none());
            }
            other => panic!("wrong grant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_grant_type() {
        let request = TokenRequest {
            grant_type: Some("password".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            request.grant(),
            Err(OAuthError::UnsupportedGrantType)
        ));

        let request = TokenRequest::default();
        assert!(matches!(
            request.grant(),
            Err(OAuthError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_authorize_params_scope_split() {
        let params = AuthorizeParams {
            scope: Some("openid profile".to_string()),
            ..Default::default()
        };
        assert_eq!(params.scopes(), vec!["openid", "profile"]);
        assert_eq!(params.challenge_method(), "S256");
    }

    #[test]
    fn test_token_response_serialization_omits_absent_fields() {
        let response = TokenResponse::new(
            "at".to_string(),
            3600,
            None,
            None,
            &["openid".to_string()],
        );
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("id_token").is_none());
    }

    #[test]
    fn test_inactive_introspection_has_no_claims() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn test_discovery_document_endpoints() {
        let config = OpenIdConfiguration::new(
            "https://id.example.test",
            vec!["openid".to_string()],
        );
        assert_eq!(config.issuer, "https://id.example.test");
        assert_eq!(
            config.authorization_endpoint,
            "https://id.example.test/authorize"
        );
        assert_eq!(config.jwks_uri, "https://id.example.test/jwks");
        assert_eq!(config.response_types_supported, vec!["code"]);
        assert_eq!(config.code_challenge_methods_supported, vec!["S256"]);
    }
}
