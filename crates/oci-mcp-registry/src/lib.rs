//! # OCI MCP Registry
//!
//! Read-only OCI Distribution client and referrer graph resolver.
//!
//! This crate discloses metadata about images and artifacts stored in
//! OCI-compatible registries: repository catalogs, tags, manifests, JSON
//! blobs and the graph of artifacts referring to a subject (signatures,
//! SBOMs, attestations).
//!
//! ## Features
//!
//! - **Distribution API**: catalog, tags, manifests, blobs and referrers,
//!   with `Link` pagination and the referrers tag schema fallback
//! - **Authentication**: Docker `config.json` credentials, basic auth and
//!   bearer token challenges with a shared token cache
//! - **Referrer graphs**: cycle-safe, cancellable resolution into a
//!   deterministic tree
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oci_mcp_registry::{resolve_referrers, ClientOptions, Reference, Remote};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = Remote::new(ClientOptions::default())?;
//!     let reference = Reference::parse("ghcr.io/oras-project/oras:v1.2.0")?;
//!
//!     let repository = remote.repository(&reference)?;
//!     let target = reference.reference.as_ref().ok_or("tag or digest required")?;
//!     let root = repository.resolve(target).await?;
//!
//!     let tree = resolve_referrers(&root, None, &repository, &CancellationToken::new()).await?;
//!     println!("{}", serde_json::to_string_pretty(&tree)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Remote                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ reqwest     │  │ TokenCache  │  │  CredentialStore    │  │
//! │  │ (HTTP/TLS)  │  │ (Bearer)    │  │  (config.json)      │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                          │ registry(name)
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   RegistryClient ──repository(name)──▶ Repository           │
//! │                                        (ReferrerSource)     │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                  resolve_referrers()
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod auth;
mod client;
mod config;
mod credentials;
mod digest;
mod error;
mod oci;
mod reference;
mod referrers;
mod retry;

pub use client::{RegistryClient, Remote, Repository};
pub use config::{
    is_plain_http, ClientOptions, RegistryAuth, RegistryConfig, TlsConfig,
    DEFAULT_MAX_CONTENT_SIZE, USER_AGENT,
};
pub use credentials::CredentialStore;
pub use digest::Digest;
pub use error::{RegistryError, Result};
pub use oci::{Descriptor, ErrorResponse, Index, MediaType, RepositoryList, TagList};
pub use reference::{validate_registry_name, validate_repository_name, Reference, TagOrDigest};
pub use referrers::{resolve_referrers, ReferrerNode, ReferrerSource};
pub use retry::RetryPolicy;
