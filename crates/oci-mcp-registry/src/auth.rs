//! Token-challenge authentication for the Distribution API.
//!
//! Registries answer unauthenticated requests with `401` and a
//! `WWW-Authenticate` challenge. For `Bearer` challenges a token is fetched
//! from the challenge realm and cached per registry and scope; for `Basic`
//! challenges the configured credentials are attached directly.

use std::collections::HashMap;

use base64::Engine as _;
use parking_lot::RwLock;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use crate::config::RegistryAuth;
use crate::error::{RegistryError, Result};

/// OAuth2 client id sent with refresh-token grants.
const CLIENT_ID: &str = "oci-mcp";

/// Authentication scheme announced by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// HTTP basic authentication.
    Basic,
    /// Bearer token authentication.
    Bearer,
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Announced scheme.
    pub scheme: Scheme,
    /// Challenge parameters (`realm`, `service`, `scope`, ...), keys lowercased.
    pub params: HashMap<String, String>,
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for unknown schemes.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::auth::{Challenge, Scheme};
    ///
    /// let challenge = Challenge::parse(
    ///     r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
    /// ).unwrap();
    /// assert_eq!(challenge.scheme, Scheme::Bearer);
    /// assert_eq!(challenge.realm(), Some("https://auth.example.com/token"));
    /// ```
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        let scheme = if scheme.eq_ignore_ascii_case("bearer") {
            Scheme::Bearer
        } else if scheme.eq_ignore_ascii_case("basic") {
            Scheme::Basic
        } else {
            return None;
        };

        Some(Self {
            scheme,
            params: parse_params(rest),
        })
    }

    /// Returns the token endpoint.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.params.get("realm").map(String::as_str)
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.params.get("service").map(String::as_str)
    }

    /// Returns the requested scope.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.params.get("scope").map(String::as_str)
    }
}

/// Parses `key="quoted \" value",key=token` parameter lists.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.insert(key.trim().to_ascii_lowercase(), value);
    }

    params
}

/// Tokens and schemes learned from registry challenges.
///
/// Shared by every client built from the same [`Remote`](crate::Remote) so
/// that token exchanges are not repeated per request.
#[derive(Debug, Default)]
pub struct TokenCache {
    schemes: RwLock<HashMap<String, Scheme>>,
    tokens: RwLock<HashMap<(String, String), String>>,
}

impl TokenCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scheme last announced by `registry`.
    #[must_use]
    pub fn scheme(&self, registry: &str) -> Option<Scheme> {
        self.schemes.read().get(registry).copied()
    }

    /// Records the scheme announced by `registry`.
    pub fn set_scheme(&self, registry: &str, scheme: Scheme) {
        self.schemes.write().insert(registry.to_string(), scheme);
    }

    /// Returns the cached token for `registry` and `scope`.
    #[must_use]
    pub fn token(&self, registry: &str, scope: &str) -> Option<String> {
        self.tokens
            .read()
            .get(&(registry.to_string(), scope.to_string()))
            .cloned()
    }

    /// Caches a token for `registry` and `scope`.
    pub fn set_token(&self, registry: &str, scope: &str, token: String) {
        self.tokens
            .write()
            .insert((registry.to_string(), scope.to_string()), token);
    }

    /// Drops the cached token for `registry` and `scope`.
    pub fn invalidate(&self, registry: &str, scope: &str) {
        self.tokens
            .write()
            .remove(&(registry.to_string(), scope.to_string()));
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Builds a `Basic` authorization header value.
///
/// # Errors
///
/// Returns an error if the credentials cannot form a header value.
pub fn basic_header(username: &str, password: &str) -> Result<HeaderValue> {
    let credentials =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
        RegistryError::AuthenticationFailed {
            message: "Invalid credentials".to_string(),
        }
    })
}

/// Builds a `Bearer` authorization header value.
///
/// # Errors
///
/// Returns an error if the token cannot form a header value.
pub fn bearer_header(token: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        RegistryError::AuthenticationFailed {
            message: "Invalid token".to_string(),
        }
    })
}

/// Exchanges credentials for a bearer token at the challenge realm.
///
/// Anonymous and basic credentials use the distribution token endpoint
/// (`GET realm?service=..&scope=..`); identity tokens use the OAuth2
/// refresh-token grant (`POST realm`).
///
/// # Errors
///
/// Returns an error if the realm is missing or the token endpoint rejects
/// the request.
pub async fn fetch_token(
    http: &reqwest::Client,
    challenge: &Challenge,
    scope: &str,
    auth: &RegistryAuth,
) -> Result<String> {
    let realm = challenge
        .realm()
        .ok_or_else(|| RegistryError::AuthenticationFailed {
            message: "bearer challenge without realm".to_string(),
        })?;
    let realm = url::Url::parse(realm).map_err(|_| RegistryError::InvalidUrl {
        url: realm.to_string(),
    })?;
    let service = challenge.service().unwrap_or_default();

    let request = match auth {
        RegistryAuth::IdentityToken { token } => {
            let mut form = vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", token.as_str()),
                ("client_id", CLIENT_ID),
                ("service", service),
            ];
            form.extend(scope.split(' ').filter(|s| !s.is_empty()).map(|s| ("scope", s)));
            http.post(realm).form(&form)
        }
        _ => {
            let mut url = realm;
            {
                let mut query = url.query_pairs_mut();
                if !service.is_empty() {
                    query.append_pair("service", service);
                }
                for s in scope.split(' ').filter(|s| !s.is_empty()) {
                    query.append_pair("scope", s);
                }
            }
            let request = http.get(url);
            match auth {
                RegistryAuth::Basic { username, password } => {
                    request.header(AUTHORIZATION, basic_header(username, password)?)
                }
                _ => request,
            }
        }
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::AuthenticationFailed {
            message: format!(
                "token endpoint returned {status}: {}",
                response.text().await.unwrap_or_default()
            ),
        });
    }

    let body: TokenResponse = response.json().await?;
    body.token
        .filter(|t| !t.is_empty())
        .or(body.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RegistryError::AuthenticationFailed {
            message: "token endpoint returned no token".to_string(),
        })
}
