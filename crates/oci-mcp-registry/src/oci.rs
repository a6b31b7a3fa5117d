//! Wire types of the OCI image and distribution specifications.
//!
//! This module defines types that conform to the OCI image and distribution
//! specifications for container registry APIs.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Result;

/// OCI and Docker media types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, JsonSchema)]
pub struct MediaType(String);

impl MediaType {
    /// `application/vnd.oci.image.manifest.v1+json`
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// `application/vnd.oci.image.index.v1+json`, also used for referrers responses.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker image manifest (schema 2) media type.
    pub const DOCKER_MANIFEST: &'static str = "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list media type.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// OCI empty JSON descriptor media type.
    pub const OCI_EMPTY: &'static str = "application/vnd.oci.empty.v1+json";

    /// Media types accepted when resolving or fetching manifests.
    pub const MANIFEST_ACCEPT: &'static [&'static str] = &[
        Self::OCI_MANIFEST,
        Self::OCI_INDEX,
        Self::DOCKER_MANIFEST,
        Self::DOCKER_MANIFEST_LIST,
    ];

    /// Wraps a media type string.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the raw media type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for manifest and index media types.
    #[must_use]
    pub fn is_manifest(&self) -> bool {
        Self::MANIFEST_ACCEPT.contains(&self.0.as_str())
    }

    /// Joins [`MediaType::MANIFEST_ACCEPT`] into an `Accept` header value.
    #[must_use]
    pub fn manifest_accept_header() -> String {
        Self::MANIFEST_ACCEPT.join(", ")
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Content descriptor.
///
/// Points at a stored object by digest, carrying its media type and size
/// so a reader can decide whether to fetch it.
///
/// Two descriptors are equal when their digests are equal; the other fields
/// do not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the target.
    pub media_type: MediaType,

    /// Content digest. Kept as received; see [`Descriptor::parsed_digest`].
    pub digest: String,

    /// Target size in bytes.
    pub size: u64,

    /// Alternative download locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    /// Annotations, ordered by key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Artifact type, set on referrer manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Descriptor {
    /// Creates a descriptor without optional fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::{Descriptor, MediaType};
    ///
    /// let desc = Descriptor::new(
    ///     MediaType::new(MediaType::OCI_MANIFEST),
    ///     "sha256:abc123...",
    ///     1024,
    /// );
    /// assert_eq!(desc.size, 1024);
    /// ```
    #[must_use]
    pub fn new(media_type: MediaType, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type,
            digest: digest.into(),
            size,
            urls: None,
            annotations: None,
            artifact_type: None,
        }
    }

    /// Sets the artifact type.
    #[must_use]
    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Parses the descriptor's digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the digest is malformed.
    pub fn parsed_digest(&self) -> Result<Digest> {
        Digest::parse(&self.digest)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Descriptor {}

impl std::hash::Hash for Descriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

/// OCI Image Index.
///
/// Returned by the referrers API, where each entry of `manifests` is a
/// manifest that refers to the queried subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Always 2.
    pub schema_version: u32,

    /// Media type of this index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    /// Manifests listed by the index.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl Index {
    /// Creates an index over the given manifests.
    #[must_use]
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(MediaType::new(MediaType::OCI_INDEX)),
            manifests,
        }
    }
}

/// Page of `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    #[serde(default)]
    pub name: String,

    /// List of tags. Some registries send `null` for an empty repository.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

/// Response from the `/v2/_catalog` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryList {
    /// List of repositories.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub repositories: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Error body returned with non-2xx registry responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// List of errors.
    pub errors: Vec<RegistryApiError>,
}

impl ErrorResponse {
    /// Renders the errors as a single message, e.g. `NAME_UNKNOWN: repository name not known`.
    #[must_use]
    pub fn to_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One entry of an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryApiError {
    /// Error code.
    pub code: String,

    /// Message for humans.
    #[serde(default)]
    pub message: String,

    /// Additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptor_new() {
        let desc = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:abc123def456", 1024);
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.digest, "sha256:abc123def456");
        assert!(desc.artifact_type.is_none());
        assert!(desc.parsed_digest().is_err());
    }

    #[test]
    fn test_descriptor_identity_is_digest() {
        let a = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:aaa", 10)
            .with_artifact_type("application/vnd.example.sig");
        let b = Descriptor::new(MediaType::new(MediaType::OCI_INDEX), "sha256:aaa", 99);
        let c = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:ccc", 10);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_descriptor_serialization_is_camel_case() {
        let desc = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:abc", 100)
            .with_artifact_type("application/vnd.test")
            .with_annotation("b", "2")
            .with_annotation("a", "1");

        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(
            json,
            r#"{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:abc","size":100,"annotations":{"a":"1","b":"2"},"artifactType":"application/vnd.test"}"#
        );
    }

    #[test]
    fn test_index_deserialization() {
        let json = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:abc", "size": 1, "artifactType": "application/vnd.test"}
            ]
        }"#;

        let index: Index = serde_json::from_str(json).unwrap();
        assert_eq!(index.manifests.len(), 1);
        assert_eq!(index.manifests[0].artifact_type.as_deref(), Some("application/vnd.test"));
    }

    #[test]
    fn test_index_without_manifests() {
        let index: Index = serde_json::from_str(r#"{"schemaVersion": 2}"#).unwrap();
        assert!(index.manifests.is_empty());
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{
            "name": "library/hello-world",
            "tags": ["v1.0.0", "v1.1.0", "latest"]
        }"#;

        let tags: TagList = serde_json::from_str(json).unwrap();
        assert_eq!(tags.name, "library/hello-world");
        assert_eq!(tags.tags.len(), 3);

        let empty: TagList = serde_json::from_str(r#"{"name": "x", "tags": null}"#).unwrap();
        assert!(empty.tags.is_empty());
    }

    #[test]
    fn test_error_response_message() {
        let json = r#"{"errors":[{"code":"NAME_UNKNOWN","message":"repository name not known"}]}"#;
        let response: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.to_message(), "NAME_UNKNOWN: repository name not known");
    }

    #[test]
    fn test_manifest_accept_header() {
        let accept = MediaType::manifest_accept_header();
        assert!(accept.contains(MediaType::OCI_MANIFEST));
        assert!(accept.contains(MediaType::DOCKER_MANIFEST_LIST));
        assert!(MediaType::new(MediaType::OCI_INDEX).is_manifest());
        assert!(!MediaType::new(MediaType::OCI_EMPTY).is_manifest());
    }
}
