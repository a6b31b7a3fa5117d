//! Transport settings for registry access.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default limit for manifest and blob bodies (4 MiB).
pub const DEFAULT_MAX_CONTENT_SIZE: u64 = 4 * 1024 * 1024;

/// User agent sent with every registry request.
pub const USER_AGENT: &str = concat!("oci-mcp/", env!("CARGO_PKG_VERSION"));

/// Configuration for a client talking to a single registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry host, optionally with port (e.g. `localhost:5000`).
    pub registry: String,

    /// Use plain HTTP instead of HTTPS.
    pub plain_http: bool,

    /// Authentication configuration.
    pub auth: RegistryAuth,

    /// Request timeout.
    pub timeout: Duration,

    /// TLS configuration for custom CAs and mTLS.
    pub tls: Option<TlsConfig>,

    /// User agent string.
    pub user_agent: String,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,

    /// Maximum accepted manifest size in bytes.
    pub max_manifest_size: u64,

    /// Maximum accepted blob size in bytes.
    pub max_blob_size: u64,
}

impl RegistryConfig {
    /// Creates a configuration for the given registry host.
    ///
    /// Plain HTTP is selected for `localhost` registries.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::for_registry("localhost:5000");
    /// assert!(config.plain_http);
    /// assert_eq!(config.base_url(), "http://localhost:5000");
    ///
    /// let config = RegistryConfig::for_registry("mcr.microsoft.com");
    /// assert_eq!(config.base_url(), "https://mcr.microsoft.com");
    /// ```
    #[must_use]
    pub fn for_registry(registry: impl Into<String>) -> Self {
        let registry = registry.into();
        Self {
            plain_http: is_plain_http(&registry),
            registry,
            auth: RegistryAuth::None,
            timeout: Duration::from_secs(30),
            tls: None,
            user_agent: USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
            max_manifest_size: DEFAULT_MAX_CONTENT_SIZE,
            max_blob_size: DEFAULT_MAX_CONTENT_SIZE,
        }
    }

    /// Forces plain HTTP on or off.
    #[must_use]
    pub const fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the blob size limit.
    #[must_use]
    pub const fn with_max_blob_size(mut self, size: u64) -> Self {
        self.max_blob_size = size;
        self
    }

    /// Sets the manifest size limit.
    #[must_use]
    pub const fn with_max_manifest_size(mut self, size: u64) -> Self {
        self.max_manifest_size = size;
        self
    }

    /// Returns the scheme and authority of the registry.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{scheme}://{}", self.registry)
    }
}

/// Returns true if the registry should be contacted over plain HTTP.
///
/// Only `localhost`, with or without a port, qualifies.
#[must_use]
pub fn is_plain_http(registry: &str) -> bool {
    let host = registry.rsplit_once(':').map_or(registry, |(host, _)| host);
    host == "localhost"
}

/// Credentials presented to a registry.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Anonymous access.
    #[default]
    None,

    /// Username and password, sent as HTTP basic auth or used to obtain a
    /// bearer token.
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Static bearer token sent with every request.
    Bearer {
        /// Token value.
        token: String,
    },

    /// OAuth2 refresh token exchanged for access tokens at the auth realm.
    IdentityToken {
        /// Refresh token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Username and password credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// assert!(!auth.is_anonymous());
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A fixed bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Creates identity (refresh) token authentication.
    #[must_use]
    pub fn identity_token(token: impl Into<String>) -> Self {
        Self::IdentityToken {
            token: token.into(),
        }
    }

    /// Returns true for anonymous access.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
            Self::IdentityToken { .. } => f.debug_struct("IdentityToken").finish_non_exhaustive(),
        }
    }
}

/// TLS configuration for custom CAs and mTLS connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Extra PEM root certificate to trust.
    pub ca_cert: Option<PathBuf>,

    /// PEM client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,

    /// PEM private key matching `client_cert`.
    pub client_key: Option<PathBuf>,

    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Verifies servers against the system roots only.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            client_cert: None,
            client_key: None,
            insecure_skip_verify: false,
        }
    }

    /// Trusts an additional root certificate.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Presents a client certificate.
    #[must_use]
    pub fn with_client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Disables server certificate verification.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}

/// Process-wide client settings from which per-registry configurations are
/// derived by [`Remote`](crate::Remote).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout.
    pub timeout: Duration,

    /// TLS configuration shared by all registries.
    pub tls: Option<TlsConfig>,

    /// Registries contacted over plain HTTP in addition to `localhost`.
    pub plain_http_registries: Vec<String>,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,

    /// Maximum accepted manifest size in bytes.
    pub max_manifest_size: u64,

    /// Maximum accepted blob size in bytes.
    pub max_blob_size: u64,

    /// Explicit Docker config file; `None` uses the default location.
    pub docker_config: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tls: None,
            plain_http_registries: Vec::new(),
            retry: RetryPolicy::default(),
            max_manifest_size: DEFAULT_MAX_CONTENT_SIZE,
            max_blob_size: DEFAULT_MAX_CONTENT_SIZE,
            docker_config: None,
        }
    }
}

impl ClientOptions {
    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Adds a registry to contact over plain HTTP.
    #[must_use]
    pub fn with_plain_http_registry(mut self, registry: impl Into<String>) -> Self {
        self.plain_http_registries.push(registry.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the Docker config file path.
    #[must_use]
    pub fn with_docker_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_config = Some(path.into());
        self
    }

    /// Sets the blob size limit.
    #[must_use]
    pub const fn with_max_blob_size(mut self, size: u64) -> Self {
        self.max_blob_size = size;
        self
    }

    /// Derives the configuration for one registry.
    #[must_use]
    pub fn registry_config(&self, registry: &str, auth: RegistryAuth) -> RegistryConfig {
        let plain_http =
            is_plain_http(registry) || self.plain_http_registries.iter().any(|r| r == registry);

        let mut config = RegistryConfig::for_registry(registry)
            .with_plain_http(plain_http)
            .with_auth(auth)
            .with_timeout(self.timeout)
            .with_retry(self.retry.clone())
            .with_max_manifest_size(self.max_manifest_size)
            .with_max_blob_size(self.max_blob_size);
        if let Some(ref tls) = self.tls {
            config = config.with_tls(tls.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plain_http() {
        assert!(is_plain_http("localhost"));
        assert!(is_plain_http("localhost:5000"));
        assert!(!is_plain_http("example.com"));
        assert!(!is_plain_http("example.com:5000"));
        assert!(!is_plain_http("192.168.1.1:5000"));
        assert!(!is_plain_http("localhost.example.com"));
    }

    #[test]
    fn test_config_defaults() {
        let config = RegistryConfig::for_registry("example.com");
        assert_eq!(config.registry, "example.com");
        assert!(!config.plain_http);
        assert!(config.auth.is_anonymous());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_blob_size, DEFAULT_MAX_CONTENT_SIZE);
        assert!(config.user_agent.starts_with("oci-mcp/"));
    }

    #[test]
    fn test_options_plain_http_override() {
        let options = ClientOptions::default().with_plain_http_registry("registry.internal:5000");
        assert!(options.registry_config("registry.internal:5000", RegistryAuth::None).plain_http);
        assert!(!options.registry_config("registry.internal", RegistryAuth::None).plain_http);
        assert!(options.registry_config("localhost:5000", RegistryAuth::None).plain_http);
    }

    #[test]
    fn test_options_propagate() {
        let options = ClientOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_tls(TlsConfig::new().insecure())
            .with_max_blob_size(16);
        let config = options.registry_config("example.com", RegistryAuth::basic("u", "p"));

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_blob_size, 16);
        assert!(config.tls.as_ref().is_some_and(|t| t.insecure_skip_verify));
        assert_eq!(config.auth, RegistryAuth::basic("u", "p"));
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let debug = format!("{:?}", RegistryAuth::basic("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));

        let debug = format!("{:?}", RegistryAuth::bearer("secret-token"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_tls_config() {
        let tls = TlsConfig::new()
            .with_ca_cert("/etc/oci-mcp/roots.pem")
            .with_client_cert("/etc/oci-mcp/client.pem", "/etc/oci-mcp/client-key.pem");

        assert_eq!(tls.ca_cert.as_deref(), Some(std::path::Path::new("/etc/oci-mcp/roots.pem")));
        assert!(tls.client_cert.is_some() && tls.client_key.is_some());
        assert!(!tls.insecure_skip_verify);
        assert_ne!(tls, TlsConfig::default());
    }
}
