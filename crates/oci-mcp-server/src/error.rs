//! Error types for the server crate.

use oci_mcp_registry::RegistryError;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors returned by a tool invocation.
///
/// These are reported to the client as tool results with `isError` set,
/// not as protocol errors.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The arguments were rejected before any registry access.
    #[error("{message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// The registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The invocation was cancelled by the client.
    #[error("operation cancelled")]
    Cancelled,

    /// Tool output could not be encoded.
    #[error("failed to encode tool output: {source}")]
    Output {
        /// Underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

impl ToolError {
    /// Creates an input validation error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Returns true if the invocation stopped because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Registry(RegistryError::Cancelled))
    }
}

/// Errors that stop the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Reading from or writing to the transport failed.
    #[error("transport I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An outgoing message could not be encoded.
    #[error("failed to encode message: {source}")]
    Encode {
        /// Underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
