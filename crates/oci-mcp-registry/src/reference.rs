//! Registry references.
//!
//! A reference names a repository on a registry and optionally a tag or a
//! digest inside it: `registry/repository[:tag|@digest]`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::digest::Digest;
use crate::error::{RegistryError, Result};

static REPOSITORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*$")
        .expect("repository pattern is valid")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w[\w.-]{0,127}$").expect("tag pattern is valid"));

/// The tag or digest part of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOrDigest {
    /// A mutable tag, e.g. `v1`.
    Tag(String),
    /// An immutable content digest.
    Digest(Digest),
}

impl TagOrDigest {
    /// Returns the string used in the `/manifests/<reference>` URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::Digest(digest) => digest.as_str(),
        }
    }
}

/// A parsed and validated registry reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Registry host, optionally with port (e.g. `localhost:5000`).
    pub registry: String,

    /// Repository path inside the registry.
    pub repository: String,

    /// Tag or digest, if any.
    pub reference: Option<TagOrDigest>,
}

impl Reference {
    /// Parses a reference string.
    ///
    /// When both a tag and a digest are present, the digest wins and the tag
    /// is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::Reference;
    ///
    /// let reference = Reference::parse("registry.example.com/hello-world:v1").unwrap();
    /// assert_eq!(reference.registry, "registry.example.com");
    /// assert_eq!(reference.repository, "hello-world");
    /// assert_eq!(reference.tag(), Some("v1"));
    ///
    /// assert!(Reference::parse("hello-world:v1").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if any part is malformed.
    pub fn parse(input: &str) -> Result<Self> {
        let (registry, path) = input
            .split_once('/')
            .ok_or_else(|| invalid(input, "missing repository"))?;

        let (repository, reference) = if let Some((repository, digest)) = path.split_once('@') {
            let repository = repository.split_once(':').map_or(repository, |(repo, _)| repo);
            let digest = Digest::parse(digest).map_err(|e| invalid(input, &e.to_string()))?;
            (repository, Some(TagOrDigest::Digest(digest)))
        } else if let Some((repository, tag)) = path.rsplit_once(':') {
            validate_tag(input, tag)?;
            (repository, Some(TagOrDigest::Tag(tag.to_string())))
        } else {
            (path, None)
        };

        validate_registry(input, registry)?;
        validate_repository(input, repository)?;

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            reference,
        })
    }

    /// Builds a reference from structured parts.
    ///
    /// A non-empty digest takes priority over the tag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if registry or repository
    /// are missing or any part is malformed.
    pub fn from_parts(
        registry: &str,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self> {
        let whole = format!("{registry}/{repository}");
        if registry.is_empty() {
            return Err(invalid(&whole, "empty registry"));
        }
        if repository.is_empty() {
            return Err(invalid(&whole, "empty repository"));
        }
        validate_registry(&whole, registry)?;
        validate_repository(&whole, repository)?;

        let reference = match (non_empty(tag), non_empty(digest)) {
            (_, Some(digest)) => Some(TagOrDigest::Digest(
                Digest::parse(digest).map_err(|e| invalid(&whole, &e.to_string()))?,
            )),
            (Some(tag), None) => {
                validate_tag(&whole, tag)?;
                Some(TagOrDigest::Tag(tag.to_string()))
            }
            (None, None) => None,
        };

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            reference,
        })
    }

    /// Returns the tag, if the reference carries one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            Some(TagOrDigest::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Returns the digest, if the reference carries one.
    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        match &self.reference {
            Some(TagOrDigest::Digest(digest)) => Some(digest),
            _ => None,
        }
    }

    /// Returns the tag or digest string, if any.
    #[must_use]
    pub fn reference_str(&self) -> Option<&str> {
        self.reference.as_ref().map(TagOrDigest::as_str)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        match &self.reference {
            Some(TagOrDigest::Tag(tag)) => write!(f, ":{tag}"),
            Some(TagOrDigest::Digest(digest)) => write!(f, "@{digest}"),
            None => Ok(()),
        }
    }
}

impl FromStr for Reference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Validates a registry name of the form `host[:port]`.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidReference`] if the name does not
/// round-trip through URL authority parsing unchanged.
pub fn validate_registry_name(registry: &str) -> Result<()> {
    validate_registry(registry, registry)
}

/// Validates a repository name.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidReference`] if the name is not a valid
/// lowercase repository path.
pub fn validate_repository_name(repository: &str) -> Result<()> {
    validate_repository(repository, repository)
}

fn validate_registry(input: &str, registry: &str) -> Result<()> {
    let url = url::Url::parse(&format!("dummy://{registry}"))
        .map_err(|_| invalid(input, &format!("invalid registry {registry:?}")))?;

    let authority = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let plain = url.username().is_empty()
        && url.password().is_none()
        && url.query().is_none()
        && url.fragment().is_none()
        && (url.path().is_empty() || url.path() == "/");

    if registry.is_empty() || !plain || authority != registry {
        return Err(invalid(input, &format!("invalid registry {registry:?}")));
    }
    Ok(())
}

fn validate_repository(input: &str, repository: &str) -> Result<()> {
    if REPOSITORY_RE.is_match(repository) {
        Ok(())
    } else {
        Err(invalid(input, &format!("invalid repository {repository:?}")))
    }
}

fn validate_tag(input: &str, tag: &str) -> Result<()> {
    if TAG_RE.is_match(tag) {
        Ok(())
    } else {
        Err(invalid(input, &format!("invalid tag {tag:?}")))
    }
}

fn invalid(reference: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_parse_repository_only() {
        let r = Reference::parse("registry.example.com/hello-world").unwrap();
        assert_eq!(r.registry, "registry.example.com");
        assert_eq!(r.repository, "hello-world");
        assert!(r.reference.is_none());
    }

    #[test]
    fn test_parse_tag() {
        let r = Reference::parse("localhost:5000/library/hello-world:v1").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "library/hello-world");
        assert_eq!(r.tag(), Some("v1"));
        assert_eq!(r.to_string(), "localhost:5000/library/hello-world:v1");
    }

    #[test]
    fn test_parse_digest() {
        let r = Reference::parse(&format!("registry.example.com/hello-world@{DIGEST}")).unwrap();
        assert_eq!(r.digest().map(Digest::as_str), Some(DIGEST));
        assert!(r.tag().is_none());
    }

    #[test]
    fn test_parse_tag_and_digest_keeps_digest() {
        let r = Reference::parse(&format!("registry.example.com/hello-world:v1@{DIGEST}")).unwrap();
        assert_eq!(r.repository, "hello-world");
        assert_eq!(r.reference_str(), Some(DIGEST));
        assert!(r.tag().is_none());
    }

    #[test]
    fn test_parse_errors() {
        for input in [
            "",
            "hello-world:v1",
            "registry.example.com/",
            "registry.example.com/Hello-World",
            "registry.example.com/hello@sha256:zzzz",
            "registry.example.com/hello:-bad",
            "https://registry.example.com/hello",
        ] {
            let err = Reference::parse(input).unwrap_err();
            assert!(
                err.to_string().starts_with("Invalid reference format"),
                "unexpected error for {input:?}: {err}"
            );
        }
    }

    #[test]
    fn test_from_parts_digest_wins() {
        let r = Reference::from_parts("localhost:5000", "repo", Some("latest"), Some(DIGEST)).unwrap();
        assert_eq!(r.reference_str(), Some(DIGEST));
        assert_eq!(r.to_string(), format!("localhost:5000/repo@{DIGEST}"));
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(Reference::from_parts("", "repo", Some("latest"), None).is_err());
        assert!(Reference::from_parts("localhost:5000", "", Some("latest"), None).is_err());
        assert!(Reference::from_parts("localhost:5000", "INVALID_REPO", Some("latest"), None).is_err());
        assert!(Reference::from_parts("localhost:5000", "repo", None, Some("invalid-digest")).is_err());
        assert!(Reference::from_parts("://invalid:registry:format", "repo", None, None).is_err());

        let r = Reference::from_parts("localhost:5000", "repo", Some(""), Some("")).unwrap();
        assert!(r.reference.is_none());
    }

    #[test]
    fn test_validate_registry_name() {
        assert!(validate_registry_name("localhost").is_ok());
        assert!(validate_registry_name("localhost:5000").is_ok());
        assert!(validate_registry_name("192.168.1.1:5000").is_ok());
        assert!(validate_registry_name("mcr.microsoft.com").is_ok());
        assert!(validate_registry_name("https://example.com").is_err());
        assert!(validate_registry_name("example.com/path").is_err());
        assert!(validate_registry_name("user@example.com").is_err());
        assert!(validate_registry_name("").is_err());
    }

    #[test]
    fn test_validate_repository_name() {
        assert!(validate_repository_name("a/b-c/d_e.f").is_ok());
        assert!(validate_repository_name("a__b").is_ok());
        assert!(validate_repository_name("a___b").is_err());
        assert!(validate_repository_name("-a").is_err());
        assert!(validate_repository_name("a//b").is_err());
    }
}
