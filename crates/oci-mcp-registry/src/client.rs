//! OCI Distribution API client.
//!
//! [`Remote`] owns the transport shared by every registry: one HTTP client,
//! the token cache and the credential store. [`RegistryClient`] issues the
//! read-only Distribution API calls against a single registry, and
//! [`Repository`] binds a client to one repository so it can act as a
//! [`ReferrerSource`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LINK,
    WWW_AUTHENTICATE,
};
use reqwest::{Response, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use url::Url;

use crate::auth::{self, Challenge, Scheme, TokenCache};
use crate::config::{ClientOptions, RegistryAuth, RegistryConfig, TlsConfig, USER_AGENT};
use crate::credentials::CredentialStore;
use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::oci::{Descriptor, ErrorResponse, Index, MediaType, RepositoryList, TagList};
use crate::reference::{validate_registry_name, validate_repository_name, Reference, TagOrDigest};
use crate::referrers::ReferrerSource;
use crate::retry::RetryPolicy;

/// Header carrying the canonical digest of a manifest.
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Header listing the filters a registry applied to a referrers response.
const OCI_FILTERS_APPLIED: &str = "oci-filters-applied";

/// Token scope for the catalog endpoint.
const CATALOG_SCOPE: &str = "registry:catalog:*";

/// Shared transport for all registries contacted by one process.
#[derive(Debug, Clone)]
pub struct Remote {
    options: ClientOptions,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    credentials: Arc<CredentialStore>,
}

impl Remote {
    /// Creates the shared transport, loading credentials from the configured
    /// Docker config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential file is malformed or the TLS
    /// material cannot be loaded.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let credentials = CredentialStore::load(options.docker_config.as_deref())?;
        Self::with_credentials(options, credentials)
    }

    /// Creates the shared transport with an explicit credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material cannot be loaded.
    pub fn with_credentials(options: ClientOptions, credentials: CredentialStore) -> Result<Self> {
        let http = build_http_client(options.timeout, options.tls.as_ref(), USER_AGENT)?;
        tracing::debug!(
            credentials = ?credentials.path(),
            plain_http = ?options.plain_http_registries,
            "Registry transport ready"
        );

        Ok(Self {
            options,
            http,
            tokens: Arc::new(TokenCache::new()),
            credentials: Arc::new(credentials),
        })
    }

    /// Returns the client options.
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns a client for the named registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry name is invalid or its stored
    /// credentials are malformed.
    pub fn registry(&self, name: &str) -> Result<RegistryClient> {
        validate_registry_name(name)?;
        let auth = self.credentials.get(name)?;
        let config = self.options.registry_config(name, auth);
        Ok(RegistryClient::with_transport(
            config,
            self.http.clone(),
            Arc::clone(&self.tokens),
        ))
    }

    /// Returns a repository handle for a parsed reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be addressed.
    pub fn repository(&self, reference: &Reference) -> Result<Repository> {
        self.registry(&reference.registry)?
            .repository(&reference.repository)
    }
}

/// Client for the read-only Distribution API of one registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
}

impl RegistryClient {
    /// Creates a standalone client with its own transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oci_mcp_registry::{RegistryClient, RegistryConfig};
    ///
    /// let config = RegistryConfig::for_registry("registry.example.com");
    /// let client = RegistryClient::new(config)?;
    /// # Ok::<(), oci_mcp_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = build_http_client(config.timeout, config.tls.as_ref(), &config.user_agent)?;
        Ok(Self::with_transport(config, http, Arc::new(TokenCache::new())))
    }

    fn with_transport(config: RegistryConfig, http: reqwest::Client, tokens: Arc<TokenCache>) -> Self {
        Self {
            config,
            http,
            tokens,
        }
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns a handle bound to one repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository name is invalid.
    pub fn repository(&self, name: &str) -> Result<Repository> {
        validate_repository_name(name)?;
        Ok(Repository {
            client: self.clone(),
            name: name.to_string(),
        })
    }

    /// Lists the repositories of the registry, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be retrieved.
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let url = self.url("/v2/_catalog")?;
        let mut repositories = Vec::new();
        self.paginate(CATALOG_SCOPE, url, &self.config.registry, |page: RepositoryList| {
            repositories.extend(page.repositories);
        })
        .await?;

        tracing::debug!(registry = %self.config.registry, count = repositories.len(), "Listed repositories");
        Ok(repositories)
    }

    /// Lists the tags of a repository, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the repository does not exist.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("/v2/{repository}/tags/list"))?;
        let subject = format!("{}/{repository}", self.config.registry);
        let mut tags = Vec::new();
        self.paginate(&pull_scope(repository), url, &subject, |page: TagList| {
            tags.extend(page.tags);
        })
        .await?;

        tracing::debug!(repository = %subject, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    /// Resolves a tag or digest to the manifest descriptor.
    ///
    /// Issues a `HEAD` request and builds the descriptor from the response
    /// headers, falling back to fetching the manifest when they are
    /// incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the manifest does not exist and
    /// [`RegistryError::DigestMismatch`] if the registry reports a digest
    /// other than the requested one.
    pub async fn resolve(&self, repository: &str, reference: &TagOrDigest) -> Result<Descriptor> {
        let url = self.manifest_url(repository, reference)?;
        let subject = self.display(repository, reference);
        let accept = MediaType::manifest_accept_header();

        let response = self
            .send(&pull_scope(repository), |http| {
                http.head(url.clone()).header(ACCEPT, accept.as_str())
            })
            .await?;
        let response = check(response, &subject).await?;
        let headers = response.headers();

        let returned = header_digest(headers)?;
        let requested = match reference {
            TagOrDigest::Digest(digest) => Some(digest),
            TagOrDigest::Tag(_) => None,
        };
        if let (Some(requested), Some(returned)) = (requested, returned.as_ref()) {
            if requested != returned {
                return Err(RegistryError::DigestMismatch {
                    expected: requested.to_string(),
                    actual: returned.to_string(),
                });
            }
        }

        let digest = returned.or_else(|| requested.cloned());
        match (content_type(headers), digest, content_length(headers)) {
            (Some(media_type), Some(digest), Some(size)) => {
                tracing::debug!(reference = %subject, digest = %digest, "Resolved manifest");
                Ok(Descriptor::new(MediaType::new(media_type), digest.to_string(), size))
            }
            _ => {
                tracing::debug!(reference = %subject, "Incomplete HEAD response, fetching manifest");
                let (descriptor, _) = self.fetch_manifest(repository, reference).await?;
                Ok(descriptor)
            }
        }
    }

    /// Fetches a manifest and its descriptor.
    ///
    /// The content is verified against the requested digest, or against the
    /// digest returned by the registry for tag references, and must be JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, too large, does not match
    /// its digest, or is not JSON.
    pub async fn fetch_manifest(
        &self,
        repository: &str,
        reference: &TagOrDigest,
    ) -> Result<(Descriptor, Vec<u8>)> {
        let url = self.manifest_url(repository, reference)?;
        let subject = self.display(repository, reference);
        let accept = MediaType::manifest_accept_header();

        let response = self
            .send(&pull_scope(repository), |http| {
                http.get(url.clone()).header(ACCEPT, accept.as_str())
            })
            .await?;
        let response = check(response, &subject).await?;
        let returned = header_digest(response.headers())?;
        let media_type = content_type(response.headers());
        let body = read_limited(response, self.config.max_manifest_size, "manifest").await?;

        let expected = match reference {
            TagOrDigest::Digest(digest) => Some(digest.clone()),
            TagOrDigest::Tag(_) => returned,
        };
        let digest = match expected {
            Some(expected) => {
                verify(&expected, &body)?;
                expected
            }
            None => Digest::from_bytes(&body),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|_| RegistryError::UnsupportedContent {
                message: format!("{subject}: manifest is not valid JSON"),
            })?;
        let media_type = media_type
            .or_else(|| {
                value
                    .get("mediaType")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
            })
            .ok_or_else(|| RegistryError::UnsupportedContent {
                message: format!("{subject}: manifest media type is unknown"),
            })?;

        let descriptor = Descriptor::new(MediaType::new(media_type), digest.to_string(), body.len() as u64);
        tracing::debug!(reference = %subject, digest = %descriptor.digest, size = descriptor.size, "Fetched manifest");
        Ok((descriptor, body))
    }

    /// Fetches a blob, which must be JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is missing, exceeds the size limit, does
    /// not match its digest, or is not JSON.
    pub async fn fetch_blob(&self, repository: &str, digest: &Digest) -> Result<Vec<u8>> {
        let url = self.url(&format!("/v2/{repository}/blobs/{digest}"))?;
        let subject = format!("{}/{repository}@{digest}", self.config.registry);

        let response = self
            .send(&pull_scope(repository), |http| http.get(url.clone()))
            .await?;
        let response = check(response, &subject).await?;
        let body = read_limited(response, self.config.max_blob_size, "blob").await?;
        verify(digest, &body)?;

        serde_json::from_slice::<IgnoredAny>(&body).map_err(|_| {
            RegistryError::UnsupportedContent {
                message: "non-JSON blob is unsupported".to_string(),
            }
        })?;

        tracing::debug!(blob = %subject, size = body.len(), "Fetched blob");
        Ok(body)
    }

    /// Lists the referrers of `subject`, invoking `on_batch` once per
    /// non-empty page.
    ///
    /// Uses the referrers API and falls back to the referrers tag schema
    /// when the registry does not implement it. When `artifact_type` is set
    /// and the registry did not apply the filter, it is applied here.
    ///
    /// # Errors
    ///
    /// Returns the first network, protocol or callback error.
    pub async fn referrers(
        &self,
        repository: &str,
        subject: &Descriptor,
        artifact_type: Option<&str>,
        on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
    ) -> Result<()> {
        let digest = subject.parsed_digest()?;
        let scope = pull_scope(repository);
        let target = format!("{}/{repository}@{digest}", self.config.registry);

        let mut url = self.url(&format!("/v2/{repository}/referrers/{digest}"))?;
        if let Some(artifact_type) = artifact_type {
            url.query_pairs_mut().append_pair("artifactType", artifact_type);
        }

        let mut fetched = HashSet::new();
        let mut first_page = true;
        loop {
            let response = self
                .send(&scope, |http| {
                    http.get(url.clone()).header(ACCEPT, MediaType::OCI_INDEX)
                })
                .await?;

            if first_page && response.status() == StatusCode::NOT_FOUND {
                tracing::debug!(subject = %target, "Referrers API unavailable, using tag schema");
                return self
                    .referrers_by_tag_schema(repository, &digest, artifact_type, on_batch)
                    .await;
            }
            first_page = false;

            let response = check(response, &target).await?;
            let filtered = filter_applied(response.headers(), "artifactType");
            let next = next_link(response.headers());
            let body = read_limited(response, self.config.max_manifest_size, "referrers index").await?;
            let index: Index = serde_json::from_slice(&body)?;

            emit(index.manifests, artifact_type.filter(|_| !filtered), on_batch)?;

            match next {
                Some(next) => url = next_page(url, &next, &mut fetched)?,
                None => return Ok(()),
            }
        }
    }

    async fn referrers_by_tag_schema(
        &self,
        repository: &str,
        digest: &Digest,
        artifact_type: Option<&str>,
        on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
    ) -> Result<()> {
        let tag = TagOrDigest::Tag(digest.as_tag());
        match self.fetch_manifest(repository, &tag).await {
            Ok((_, body)) => {
                let index: Index = serde_json::from_slice(&body)?;
                emit(index.manifests, artifact_type, on_batch)
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Follows `Link` pagination, decoding every page as `T`.
    async fn paginate<T, F>(&self, scope: &str, mut url: Url, subject: &str, mut each: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T) + Send,
    {
        let mut fetched = HashSet::new();
        loop {
            let response = self.send(scope, |http| http.get(url.clone())).await?;
            let response = check(response, subject).await?;
            let next = next_link(response.headers());
            each(response.json::<T>().await?);

            match next {
                Some(next) => url = next_page(url, &next, &mut fetched)?,
                None => return Ok(()),
            }
        }
    }

    /// Sends a request built by `build`, applying authentication and the
    /// retry policy.
    ///
    /// A `401` with a usable challenge is answered once per call; the
    /// response is returned unchecked.
    async fn send<F>(&self, scope: &str, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        let mut challenged = false;

        loop {
            let mut request = build(&self.http).build()?;
            if let Some(value) = self.authorization(scope)? {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            let method = request.method().clone();
            let url = request.url().clone();
            tracing::debug!(%method, %url, attempt, "Registry request");

            let response = match self.http.execute(request).await {
                Ok(response) => response,
                Err(e) if attempt < retry.max_retries && RetryPolicy::is_retryable_error(&e) => {
                    let wait = retry.backoff_for(attempt);
                    tracing::warn!(%method, %url, error = %e, ?wait, "Registry request failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if attempt < retry.max_retries && RetryPolicy::is_retryable_status(status) {
                let wait = retry
                    .retry_after(&response)
                    .unwrap_or_else(|| retry.backoff_for(attempt));
                tracing::warn!(%method, %url, %status, ?wait, "Registry unavailable, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED && !challenged {
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(Challenge::parse);
                if let Some(challenge) = challenge {
                    challenged = true;
                    if self.answer(&challenge, scope).await? {
                        continue;
                    }
                }
            }

            return Ok(response);
        }
    }

    /// Returns the authorization header to attach for `scope`, if any.
    fn authorization(&self, scope: &str) -> Result<Option<HeaderValue>> {
        let registry = &self.config.registry;
        match (&self.config.auth, self.tokens.scheme(registry)) {
            (RegistryAuth::Bearer { token }, _) => auth::bearer_header(token).map(Some),
            (_, Some(Scheme::Bearer)) => self
                .tokens
                .token(registry, scope)
                .map(|token| auth::bearer_header(&token))
                .transpose(),
            (RegistryAuth::Basic { username, password }, Some(Scheme::Basic)) => {
                auth::basic_header(username, password).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Answers a challenge. Returns true if the request should be retried.
    async fn answer(&self, challenge: &Challenge, scope: &str) -> Result<bool> {
        let registry = &self.config.registry;
        match (challenge.scheme, &self.config.auth) {
            (_, RegistryAuth::Bearer { .. }) => Ok(false),
            (Scheme::Basic, RegistryAuth::Basic { .. }) => {
                self.tokens.set_scheme(registry, Scheme::Basic);
                Ok(true)
            }
            (Scheme::Basic, _) => Ok(false),
            (Scheme::Bearer, auth) => {
                let requested = challenge.scope().unwrap_or(scope);
                tracing::debug!(registry = %registry, scope = requested, "Fetching registry token");
                let token = auth::fetch_token(&self.http, challenge, requested, auth).await?;
                self.tokens.set_scheme(registry, Scheme::Bearer);
                self.tokens.set_token(registry, scope, token);
                Ok(true)
            }
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{path}", self.config.base_url()))?)
    }

    fn manifest_url(&self, repository: &str, reference: &TagOrDigest) -> Result<Url> {
        self.url(&format!("/v2/{repository}/manifests/{}", reference.as_str()))
    }

    fn display(&self, repository: &str, reference: &TagOrDigest) -> String {
        match reference {
            TagOrDigest::Tag(tag) => format!("{}/{repository}:{tag}", self.config.registry),
            TagOrDigest::Digest(digest) => format!("{}/{repository}@{digest}", self.config.registry),
        }
    }
}

/// A registry client bound to one repository.
#[derive(Debug, Clone)]
pub struct Repository {
    client: RegistryClient,
    name: String,
}

impl Repository {
    /// Returns the repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying registry client.
    #[must_use]
    pub const fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Resolves a tag or digest in this repository.
    ///
    /// # Errors
    ///
    /// See [`RegistryClient::resolve`].
    pub async fn resolve(&self, reference: &TagOrDigest) -> Result<Descriptor> {
        self.client.resolve(&self.name, reference).await
    }
}

#[async_trait]
impl ReferrerSource for Repository {
    async fn referrers(
        &self,
        subject: &Descriptor,
        artifact_type: Option<&str>,
        on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
    ) -> Result<()> {
        self.client
            .referrers(&self.name, subject, artifact_type, on_batch)
            .await
    }
}

/// Builds the HTTP client with timeout, user agent and TLS settings.
fn build_http_client(
    timeout: std::time::Duration,
    tls: Option<&TlsConfig>,
    user_agent: &str,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent);

    if let Some(tls) = tls {
        if tls.insecure_skip_verify {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref ca_cert) = tls.ca_cert {
            let pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                path: ca_cert.clone(),
                source: e,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                RegistryError::InvalidConfig {
                    message: format!("Invalid CA certificate: {e}"),
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&tls.client_cert, &tls.client_key) {
            let mut pem = std::fs::read(cert_path).map_err(|e| RegistryError::IoError {
                path: cert_path.clone(),
                source: e,
            })?;
            let key = std::fs::read(key_path).map_err(|e| RegistryError::IoError {
                path: key_path.clone(),
                source: e,
            })?;
            pem.extend_from_slice(&key);

            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                RegistryError::InvalidConfig {
                    message: format!("Invalid client certificate: {e}"),
                }
            })?;
            builder = builder.identity(identity);
        }
    }

    builder.build().map_err(|e| RegistryError::InvalidConfig {
        message: format!("Failed to build HTTP client: {e}"),
    })
}

fn pull_scope(repository: &str) -> String {
    format!("repository:{repository}:pull")
}

/// Maps a non-success response to an error.
async fn check(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .filter(|e| !e.errors.is_empty())
        .map_or_else(|| body.trim().to_string(), |e| e.to_message());

    match status {
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
            reference: subject.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RegistryError::AuthenticationFailed {
            message: if message.is_empty() {
                format!("{subject}: {status}")
            } else {
                format!("{subject}: {message}")
            },
        }),
        _ => Err(RegistryError::HttpError {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Reads the body, failing once it exceeds `limit` bytes.
async fn read_limited(mut response: Response, limit: u64, kind: &'static str) -> Result<Vec<u8>> {
    if let Some(size) = content_length(response.headers()) {
        if size > limit {
            return Err(RegistryError::ContentTooLarge { kind, size, limit });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        let size = body.len() as u64;
        if size > limit {
            return Err(RegistryError::ContentTooLarge { kind, size, limit });
        }
    }
    Ok(body)
}

fn verify(expected: &Digest, body: &[u8]) -> Result<()> {
    if expected.verify(body) {
        Ok(())
    } else {
        Err(RegistryError::DigestMismatch {
            expected: expected.to_string(),
            actual: expected.compute(body).to_string(),
        })
    }
}

/// Applies the client-side artifact type filter and hands a non-empty batch
/// to the callback.
fn emit(
    mut manifests: Vec<Descriptor>,
    artifact_type: Option<&str>,
    on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
) -> Result<()> {
    if let Some(artifact_type) = artifact_type {
        manifests.retain(|d| d.artifact_type.as_deref() == Some(artifact_type));
    }
    if manifests.is_empty() {
        return Ok(());
    }
    on_batch(manifests)
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn header_digest(headers: &HeaderMap) -> Result<Option<Digest>> {
    headers
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .map(|v| Digest::parse(v.trim()))
        .transpose()
}

fn filter_applied(headers: &HeaderMap, filter: &str) -> bool {
    headers
        .get_all(OCI_FILTERS_APPLIED)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim() == filter)
}

/// Resolves the next page against `current`.
///
/// Credentials are attached to every page, so the target must stay on the
/// registry's origin. A page is never requested twice.
fn next_page(current: Url, next: &str, fetched: &mut HashSet<Url>) -> Result<Url> {
    let url = current.join(next)?;
    let refuse = |reason| RegistryError::InvalidPagination {
        url: url.to_string(),
        reason,
    };

    if url.origin() != current.origin() {
        return Err(refuse("points outside the registry"));
    }
    fetched.insert(current);
    if fetched.contains(&url) {
        return Err(refuse("page was already fetched"));
    }
    Ok(url)
}

/// Extracts the `rel="next"` target from `Link` headers.
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|link| {
            let (target, params) = link.trim().split_once(';')?;
            let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
            params
                .split(';')
                .map(str::trim)
                .any(|p| p == "rel=\"next\"" || p == "rel=next")
                .then(|| target.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_client_creation() {
        let config = RegistryConfig::for_registry("registry.example.com");
        assert!(RegistryClient::new(config).is_ok());
    }

    #[test]
    fn test_remote_rejects_invalid_registry() {
        let remote =
            Remote::with_credentials(ClientOptions::default(), CredentialStore::empty()).unwrap();
        assert!(remote.registry("https://example.com").is_err());
        assert!(remote.registry("localhost:5000").is_ok());
    }

    #[test]
    fn test_remote_applies_plain_http() {
        let options = ClientOptions::default().with_plain_http_registry("registry.internal");
        let remote = Remote::with_credentials(options, CredentialStore::empty()).unwrap();

        let client = remote.registry("registry.internal").unwrap();
        assert_eq!(client.config().base_url(), "http://registry.internal");
        let client = remote.registry("registry.example.com").unwrap();
        assert_eq!(client.config().base_url(), "https://registry.example.com");
    }

    #[test]
    fn test_repository_validates_name() {
        let client = RegistryClient::new(RegistryConfig::for_registry("localhost:5000")).unwrap();
        assert!(client.repository("Invalid").is_err());
        assert_eq!(client.repository("library/hello").unwrap().name(), "library/hello");
    }

    #[test]
    fn test_next_link() {
        let map = headers(&[("link", r#"</v2/_catalog?last=b&n=2>; rel="next""#)]);
        assert_eq!(next_link(&map).as_deref(), Some("/v2/_catalog?last=b&n=2"));

        let map = headers(&[("link", r#"<https://a/first>; rel="prev", <https://a/next>; rel=next"#)]);
        assert_eq!(next_link(&map).as_deref(), Some("https://a/next"));

        assert!(next_link(&headers(&[("link", "<https://a/x>; rel=\"prev\"")])).is_none());
        assert!(next_link(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_next_page_stays_on_registry() {
        let first = Url::parse("https://registry.example.com/v2/_catalog").unwrap();
        let mut fetched = HashSet::new();

        let second = next_page(first.clone(), "/v2/_catalog?last=b", &mut fetched).unwrap();
        assert_eq!(second.as_str(), "https://registry.example.com/v2/_catalog?last=b");

        for foreign in [
            "https://attacker.example.com/v2/_catalog?last=c",
            "http://registry.example.com/v2/_catalog?last=c",
            "https://registry.example.com:8443/v2/_catalog?last=c",
        ] {
            let err = next_page(second.clone(), foreign, &mut fetched).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidPagination { .. }), "{foreign}");
        }

        let explicit_port = next_page(second, "https://registry.example.com:443/v2/_catalog?last=d", &mut fetched);
        assert!(explicit_port.is_ok());
    }

    #[test]
    fn test_next_page_refuses_repeats() {
        let first = Url::parse("https://registry.example.com/v2/_catalog").unwrap();
        let mut fetched = HashSet::new();

        let err = next_page(first.clone(), "/v2/_catalog", &mut fetched).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPagination { .. }));

        let mut fetched = HashSet::new();
        let second = next_page(first, "?last=a", &mut fetched).unwrap();
        let err = next_page(second, "/v2/_catalog", &mut fetched).unwrap_err();
        assert!(err.to_string().contains("already fetched"));
    }

    #[test]
    fn test_filter_applied() {
        assert!(filter_applied(&headers(&[("oci-filters-applied", "artifactType")]), "artifactType"));
        assert!(filter_applied(
            &headers(&[("oci-filters-applied", "annotation, artifactType")]),
            "artifactType"
        ));
        assert!(!filter_applied(&HeaderMap::new(), "artifactType"));
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let map = headers(&[("content-type", "application/vnd.oci.image.index.v1+json; charset=utf-8")]);
        assert_eq!(content_type(&map).as_deref(), Some(MediaType::OCI_INDEX));
    }

    #[test]
    fn test_emit_filters_and_skips_empty() {
        let matching = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:aa", 1)
            .with_artifact_type("application/vnd.example.sbom");
        let other = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:bb", 1)
            .with_artifact_type("application/vnd.example.signature");

        let mut batches = Vec::new();
        let mut on_batch = |batch: Vec<Descriptor>| -> Result<()> {
            batches.push(batch);
            Ok(())
        };
        emit(
            vec![matching.clone(), other.clone()],
            Some("application/vnd.example.sbom"),
            &mut on_batch,
        )
        .unwrap();
        emit(vec![other], Some("application/vnd.example.sbom"), &mut on_batch).unwrap();
        emit(Vec::new(), None, &mut on_batch).unwrap();

        assert_eq!(batches, vec![vec![matching]]);
    }
}
