//! JWT construction and verification for access, refresh and ID tokens.
//!
//! All tokens are RS256-signed compact JWS. The signing algorithm is
//! pinned; tokens whose header advertises anything else (including
//! `none`) fail verification. Verification checks issuer, audience,
//! expiry and not-before with a bounded clock skew, and requires a `jti`
//! so every token has a stable handle for records and the blacklist.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AuthError;
use crate::utils::token::generate_id;

/// Allowed clock skew when validating `exp`/`nbf`, in seconds.
pub const CLOCK_SKEW_SECS: u64 = 30;

/// Marker distinguishing access from refresh tokens inside the JWT.
pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Claims carried by access and refresh tokens.
///
/// `sub` is the user id for user-bound tokens and the client id for
/// client-credentials tokens. `scope` is the space-joined granted scope
/// set. Only `scope` and `permissions` vary by issuance context; the rest
/// is fixed by the builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub client_id: String,
    pub scope: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl TokenClaims {
    /// Scopes as a list.
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }

    /// Check whether the token carries a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    pub fn is_access_token(&self) -> bool {
        self.token_type == TOKEN_TYPE_ACCESS
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == TOKEN_TYPE_REFRESH
    }
}

/// Claims carried by OpenID Connect ID tokens. The audience is the
/// client itself, so these are minted but never verified server-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub auth_time: i64,
    pub azp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

/// Typed builder for token claims. The subject, client and lifetime are
/// mandatory; scope, username and permissions are the only open slots.
#[derive(Debug, Clone)]
pub struct ClaimsBuilder {
    subject: String,
    client_id: String,
    scope: String,
    username: Option<String>,
    permissions: Option<Vec<String>>,
}

impl ClaimsBuilder {
    pub fn new(subject: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            client_id: client_id.into(),
            scope: String::new(),
            username: None,
            permissions: None,
        }
    }

    pub fn scope(mut self, scopes: &[String]) -> Self {
        self.scope = scopes.join(" ");
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    fn build(self, iss: &str, aud: &str, token_type: &str, ttl_secs: i64) -> TokenClaims {
        let now = Utc::now();
        TokenClaims {
            iss: iss.to_string(),
            aud: aud.to_string(),
            sub: self.subject,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            jti: generate_id(),
            client_id: self.client_id,
            scope: self.scope,
            token_type: token_type.to_string(),
            username: self.username,
            permissions: self.permissions,
        }
    }
}

/// A public key in JWK form, as served by the JWKS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Signer/verifier built once at startup and shared by value.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    issuer: String,
    audience: String,
    kid: String,
    jwks: Arc<JwkSet>,
}

impl JwtManager {
    /// Create a manager from RSA key material in PEM form.
    ///
    /// # Arguments
    /// * `private_key_pem` - RSA private key (PKCS#1 or PKCS#8 PEM)
    /// * `public_key_pem` - RSA public key (SPKI PEM)
    /// * `issuer` - Value of the `iss` claim and discovery issuer
    /// * `audience` - Expected `aud` for access and refresh tokens
    pub fn new(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: &str,
        audience: &str,
    ) -> anyhow::Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid public key: {}", e))?;

        // A key id stable across restarts: digest of the public key.
        let kid = hex::encode(&Sha256::digest(public_key_pem.as_bytes())[..8]);

        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Invalid public key: {}", e))?;
        let jwk = Jwk {
            kty: "RSA".to_string(),
            use_: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: kid.clone(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        };

        Ok(Self {
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            kid,
            jwks: Arc::new(JwkSet { keys: vec![jwk] }),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The served JWKS document.
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header
    }

    /// Mint an access token. Returns the compact JWS and the claims it
    /// carries (the caller persists `jti` and the token digest).
    pub fn issue_access_token(
        &self,
        builder: ClaimsBuilder,
        ttl_secs: i64,
    ) -> Result<(String, TokenClaims), AuthError> {
        let claims = builder.build(&self.issuer, &self.audience, TOKEN_TYPE_ACCESS, ttl_secs);
        let token = encode(&self.header(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Token encoding failed: {}", e)))?;
        Ok((token, claims))
    }

    /// Mint a refresh token.
    pub fn issue_refresh_token(
        &self,
        builder: ClaimsBuilder,
        ttl_secs: i64,
    ) -> Result<(String, TokenClaims), AuthError> {
        let claims = builder.build(&self.issuer, &self.audience, TOKEN_TYPE_REFRESH, ttl_secs);
        let token = encode(&self.header(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Token encoding failed: {}", e)))?;
        Ok((token, claims))
    }

    /// Mint an OpenID Connect ID token for a completed authorization.
    pub fn issue_id_token(&self, mut claims: IdTokenClaims, ttl_secs: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        claims.iss = self.issuer.clone();
        claims.iat = now.timestamp();
        claims.exp = (now + Duration::seconds(ttl_secs)).timestamp();
        encode(&self.header(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Token encoding failed: {}", e)))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;

        if claims.jti.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Verify an access token: signature, issuer, audience, expiry and
    /// token type.
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.verify(token)?;
        if !claims.is_access_token() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Verify a refresh token.
    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.verify(token)?;
        if !claims.is_refresh_token() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;

    const ISSUER: &str = "https://id.example.test";
    const AUDIENCE: &str = "https://api.example.test";

    fn test_keys() -> &'static (String, String) {
        static KEYS: OnceLock<(String, String)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
                .expect("key generation failed");
            let public = private.to_public_key();
            (
                private
                    .to_pkcs8_pem(LineEnding::LF)
                    .expect("private pem")
                    .to_string(),
                public
                    .to_public_key_pem(LineEnding::LF)
                    .expect("public pem"),
            )
        })
    }

    fn test_manager() -> JwtManager {
        let (private_pem, public_pem) = test_keys();
        JwtManager::new(private_pem, public_pem, ISSUER, AUDIENCE).unwrap()
    }

    fn user_builder() -> ClaimsBuilder {
        ClaimsBuilder::new("user-1", "client-1")
            .scope(&["openid".to_string(), "profile".to_string()])
            .username("alice")
    }

    #[test]
    fn test_access_token_roundtrip() {
        let manager = test_manager();
        let (token, minted) = manager.issue_access_token(user_builder(), 3600).unwrap();

        assert_eq!(token.split('.').count(), 3);

        let claims = manager.verify_access_token(&token).unwrap();
        assert_eq!(claims, minted);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.client_id, "client-1");
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_jti_present_and_unique() {
        let manager = test_manager();
        let (_, a) = manager.issue_access_token(user_builder(), 60).unwrap();
        let (_, b) = manager.issue_access_token(user_builder(), 60).unwrap();

        assert!(!a.jti.is_empty());
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_header_pins_rs256_and_kid() {
        let manager = test_manager();
        let (token, _) = manager.issue_access_token(user_builder(), 60).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(manager.kid.as_str()));
    }

    #[test]
    fn test_refresh_token_not_accepted_as_access() {
        let manager = test_manager();
        let (token, _) = manager.issue_refresh_token(user_builder(), 60).unwrap();

        assert!(matches!(
            manager.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        assert!(manager.verify_refresh_token(&token).is_ok());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (private_pem, public_pem) = test_keys();
        let other =
            JwtManager::new(private_pem, public_pem, "https://evil.example", AUDIENCE).unwrap();
        let manager = test_manager();

        let (token, _) = other.issue_access_token(user_builder(), 60).unwrap();
        assert!(matches!(
            manager.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let (private_pem, public_pem) = test_keys();
        let other = JwtManager::new(private_pem, public_pem, ISSUER, "urn:other").unwrap();
        let manager = test_manager();

        let (token, _) = other.issue_access_token(user_builder(), 60).unwrap();
        assert!(matches!(
            manager.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_beyond_skew_rejected() {
        let manager = test_manager();
        // Expired 10 minutes ago, well past the 30 s skew.
        let (token, _) = manager.issue_access_token(user_builder(), -600).unwrap();

        assert!(matches!(
            manager.verify_access_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_recently_expired_within_skew_accepted() {
        let manager = test_manager();
        // Expired 5 s ago, inside the 30 s skew window.
        let (token, _) = manager.issue_access_token(user_builder(), -5).unwrap();

        assert!(manager.verify_access_token(&token).is_ok());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let manager = test_manager();

        assert!(matches!(
            manager.verify_access_token("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            manager.verify_access_token("a.b.c"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let manager = test_manager();
        let (token, _) = manager.issue_access_token(user_builder(), 60).unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_sig = "A".repeat(parts[2].len());
        parts[2] = &tampered_sig;
        let tampered = parts.join(".");

        assert!(matches!(
            manager.verify_access_token(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_jwks_document_shape() {
        let manager = test_manager();
        let jwks = manager.jwks();

        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.use_, "sig");
        assert_eq!(key.kid, manager.kid);
        assert!(!key.n.is_empty());
        // 65537
        assert_eq!(key.e, "AQAB");
    }

    #[test]
    fn test_id_token_claims() {
        let manager = test_manager();
        let token = manager
            .issue_id_token(
                IdTokenClaims {
                    iss: String::new(),
                    aud: "client-1".to_string(),
                    sub: "user-1".to_string(),
                    iat: 0,
                    exp: 0,
                    auth_time: Utc::now().timestamp(),
                    azp: "client-1".to_string(),
                    nonce: Some("n-0S6_WzA2Mj".to_string()),
                    email: None,
                    email_verified: None,
                },
                600,
            )
            .unwrap();

        // The audience is the client, so decode without audience pinning.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_aud = false;
        let claims = decode::<IdTokenClaims>(&token, &manager.decoding_key, &validation)
            .unwrap()
            .claims;

        assert_eq!(claims.aud, "client-1");
        assert_eq!(claims.azp, "client-1");
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn test_scope_helpers() {
        let claims = ClaimsBuilder::new("u", "c")
            .scope(&["openid".to_string(), "profile".to_string()])
            .build(ISSUER, AUDIENCE, TOKEN_TYPE_ACCESS, 60);

        assert!(claims.has_scope("openid"));
        assert!(!claims.has_scope("email"));
        assert_eq!(claims.scopes(), vec!["openid", "profile"]);
    }
}
