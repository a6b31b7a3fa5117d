//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Manifest, blob, or repository not found in registry.
    #[error("{reference}: not found")]
    NotFound {
        /// The reference that could not be found.
        reference: String,
    },

    /// Invalid reference format.
    #[error("Invalid reference format: {reference}: {reason}")]
    InvalidReference {
        /// Reference string.
        reference: String,
        /// Why the reference was rejected.
        reason: String,
    },

    /// Invalid digest format.
    #[error("Invalid digest: {digest}: {reason}")]
    InvalidDigest {
        /// Digest string.
        digest: String,
        /// Why the digest was rejected.
        reason: String,
    },

    /// Fetched content does not match its digest.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest.
        expected: String,
        /// Actual digest of the received content.
        actual: String,
    },

    /// Content exceeds the configured size limit.
    #[error("{kind} too large: {size} bytes exceeds limit of {limit} bytes")]
    ContentTooLarge {
        /// Kind of content ("manifest" or "blob").
        kind: &'static str,
        /// Size of the content.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Content type that cannot be disclosed.
    #[error("{message}")]
    UnsupportedContent {
        /// Error message.
        message: String,
    },

    /// Credential store could not be read.
    #[error("Credential store error: {message}")]
    CredentialError {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// A `Link` pagination target was refused.
    #[error("Invalid pagination link {url}: {reason}")]
    InvalidPagination {
        /// Resolved next-page URL.
        url: String,
        /// Why the link was refused.
        reason: &'static str,
    },

    /// Invalid client configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Returns true if the error reports a missing manifest, blob, or repository.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error is a caller-initiated cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = RegistryError::NotFound {
            reference: "localhost:5000/hello:v1".to_string(),
        };
        assert_eq!(err.to_string(), "localhost:5000/hello:v1: not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_digest_mismatch() {
        let err = RegistryError::DigestMismatch {
            expected: "sha256:abc".to_string(),
            actual: "sha256:def".to_string(),
        };
        assert!(err.to_string().contains("Digest mismatch"));
    }

    #[test]
    fn test_error_display_too_large() {
        let err = RegistryError::ContentTooLarge {
            kind: "blob",
            size: 10,
            limit: 4,
        };
        assert!(err.to_string().starts_with("blob too large"));
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = RegistryError::AuthenticationFailed {
            message: "invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(RegistryError::Cancelled.is_cancelled());
        assert!(!RegistryError::Cancelled.is_not_found());
    }
}
