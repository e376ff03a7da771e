//! Client authentication and request validation for the back-channel
//! endpoints.
//!
//! Credentials are taken in order of preference: HTTP Basic, then the
//! form body, then bare `client_id` for public clients. The mechanism
//! actually used must match the client's registered
//! `token_endpoint_auth_method`.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sqlx::MySqlPool;

use crate::error::OAuthError;
use crate::models::{Client, TokenEndpointAuthMethod};
use crate::repositories::{ClientRepository, ScopeRepository};
use crate::utils::password::verify_password;

/// How the caller presented credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCredentials {
    Basic { client_id: String, client_secret: String },
    Post { client_id: String, client_secret: String },
    None { client_id: String },
}

impl ClientCredentials {
    pub fn client_id(&self) -> &str {
        match self {
            ClientCredentials::Basic { client_id, .. } => client_id,
            ClientCredentials::Post { client_id, .. } => client_id,
            ClientCredentials::None { client_id } => client_id,
        }
    }

    pub fn used_basic(&self) -> bool {
        matches!(self, ClientCredentials::Basic { .. })
    }

    fn method(&self) -> TokenEndpointAuthMethod {
        match self {
            ClientCredentials::Basic { .. } => TokenEndpointAuthMethod::ClientSecretBasic,
            ClientCredentials::Post { .. } => TokenEndpointAuthMethod::ClientSecretPost,
            ClientCredentials::None { .. } => TokenEndpointAuthMethod::None,
        }
    }

    fn secret(&self) -> Option<&str> {
        match self {
            ClientCredentials::Basic { client_secret, .. } => Some(client_secret),
            ClientCredentials::Post { client_secret, .. } => Some(client_secret),
            ClientCredentials::None { .. } => None,
        }
    }
}

/// Pull client credentials out of a request: Authorization header first,
/// then the form fields.
pub fn extract_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(encoded) = value.strip_prefix("Basic ") {
            return parse_basic(encoded.trim());
        }
    }

    match (form_client_id, form_client_secret) {
        (Some(id), Some(secret)) => Ok(ClientCredentials::Post {
            client_id: id.to_string(),
            client_secret: secret.to_string(),
        }),
        (Some(id), None) => Ok(ClientCredentials::None {
            client_id: id.to_string(),
        }),
        _ => Err(OAuthError::InvalidRequest(
            "client_id is required".to_string(),
        )),
    }
}

/// Decode `Basic base64(urlencode(id):urlencode(secret))` per RFC 6749
/// §2.3.1.
fn parse_basic(encoded: &str) -> Result<ClientCredentials, OAuthError> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| OAuthError::InvalidClient { basic: true })?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| OAuthError::InvalidClient { basic: true })?;

    let (id, secret) = decoded
        .split_once(':')
        .ok_or(OAuthError::InvalidClient { basic: true })?;

    let client_id = urlencoding::decode(id)
        .map_err(|_| OAuthError::InvalidClient { basic: true })?
        .into_owned();
    let client_secret = urlencoding::decode(secret)
        .map_err(|_| OAuthError::InvalidClient { basic: true })?
        .into_owned();

    if client_id.is_empty() {
        return Err(OAuthError::InvalidClient { basic: true });
    }

    Ok(ClientCredentials::Basic {
        client_id,
        client_secret,
    })
}

/// Service resolving and authenticating clients, and validating their
/// requests against registered policy.
#[derive(Clone)]
pub struct ClientAuthService {
    clients: ClientRepository,
    scopes: ScopeRepository,
}

impl ClientAuthService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            clients: ClientRepository::new(pool.clone()),
            scopes: ScopeRepository::new(pool),
        }
    }

    pub fn clients(&self) -> &ClientRepository {
        &self.clients
    }

    /// Resolve the client behind the presented credentials and verify
    /// them.
    ///
    /// # Returns
    /// * `Ok(Client)` - The authenticated, active client
    /// * `Err(OAuthError::InvalidClient)` - Unknown client, mechanism not
    ///   allowed for it, or secret mismatch
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Client, OAuthError> {
        let basic = credentials.used_basic();

        let client = self
            .clients
            .find_active_by_client_id(credentials.client_id())
            .await?
            .ok_or(OAuthError::InvalidClient { basic })?;

        if client.token_endpoint_auth_method != credentials.method() {
            return Err(OAuthError::InvalidClient { basic });
        }

        match credentials.secret() {
            Some(secret) => {
                let hash = client
                    .client_secret_hash
                    .as_deref()
                    .ok_or(OAuthError::InvalidClient { basic })?;
                let valid = verify_password(secret, hash)
                    .map_err(|_| OAuthError::InvalidClient { basic })?;
                if !valid {
                    return Err(OAuthError::InvalidClient { basic });
                }
            }
            None => {
                // Only public clients may authenticate without a secret.
                if !client.is_public() {
                    return Err(OAuthError::InvalidClient { basic });
                }
            }
        }

        Ok(client)
    }

    /// Resolve requested scopes against client policy and the scope
    /// registry. An empty request defaults to the client's full allowed
    /// set.
    pub async fn resolve_scopes(
        &self,
        requested: &[String],
        client: &Client,
    ) -> Result<Vec<String>, OAuthError> {
        let effective: Vec<String> = if requested.is_empty() {
            client.allowed_scopes.clone()
        } else {
            for scope in requested {
                if !client.allows_scope(scope) {
                    return Err(OAuthError::InvalidScope(format!(
                        "Scope {} is not allowed for this client",
                        scope
                    )));
                }
            }
            requested.to_vec()
        };

        if !effective.is_empty() {
            let known = self.scopes.count_active_by_names(&effective).await?;
            if known != effective.len() as i64 {
                return Err(OAuthError::InvalidScope(
                    "One or more requested scopes are unknown".to_string(),
                ));
            }
        }

        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_basic(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", value)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_extract_basic() {
        let encoded = STANDARD.encode("c1:s3cret");
        let creds = extract_credentials(&headers_with_basic(&encoded), None, None).unwrap();

        assert_eq!(
            creds,
            ClientCredentials::Basic {
                client_id: "c1".to_string(),
                client_secret: "s3cret".to_string(),
            }
        );
        assert!(creds.used_basic());
    }

    #[test]
    fn test_basic_takes_precedence_over_form() {
        let encoded = STANDARD.encode("c1:s3cret");
        let creds =
            extract_credentials(&headers_with_basic(&encoded), Some("c2"), Some("other")).unwrap();

        assert_eq!(creds.client_id(), "c1");
    }

    #[test]
    fn test_extract_post() {
        let creds = extract_credentials(&HeaderMap::new(), Some("c1"), Some("s3cret")).unwrap();
        assert_eq!(
            creds,
            ClientCredentials::Post {
                client_id: "c1".to_string(),
                client_secret: "s3cret".to_string(),
            }
        );
        assert!(!creds.used_basic());
    }

    #[test]
    fn test_extract_public_none() {
        let creds = extract_credentials(&HeaderMap::new(), Some("c1"), None).unwrap();
        assert_eq!(
            creds,
            ClientCredentials::None {
                client_id: "c1".to_string()
            }
        );
    }

    #[test]
    fn test_missing_client_id_rejected() {
        let result = extract_credentials(&HeaderMap::new(), None, None);
        assert!(matches!(result, Err(OAuthError::InvalidRequest(_))));
    }

    #[test]
    fn test_basic_urlencoded_credentials() {
        // RFC 6749 §2.3.1: id and secret are form-urlencoded before
        // concatenation.
        let encoded = STANDARD.encode("a%20client:p%26ss");
        let creds = extract_credentials(&headers_with_basic(&encoded), None, None).unwrap();

        assert_eq!(creds.client_id(), "a client");
        assert_eq!(creds.secret(), Some("p&ss"));
    }

    #[test]
    fn test_malformed_basic_rejected() {
        for bad in ["!!!not-base64!!!", &STANDARD.encode("no-colon")] {
            let result = extract_credentials(&headers_with_basic(bad), None, None);
            assert!(matches!(
                result,
                Err(OAuthError::InvalidClient { basic: true })
            ));
        }
    }
}
