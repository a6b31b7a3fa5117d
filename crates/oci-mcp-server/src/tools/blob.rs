use async_trait::async_trait;
use oci_mcp_registry::{validate_repository_name, Digest, Remote};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{cancellable, object_schema, parse_args, schema_of, Tool};
use crate::error::ToolError;

/// Fetches a JSON blob, typically an image config.
#[derive(Debug, Clone)]
pub struct FetchBlob {
    remote: Remote,
}

impl FetchBlob {
    /// Creates the tool over a shared transport.
    #[must_use]
    pub const fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct Input {
    /// Registry name.
    registry: String,
    /// Repository name.
    repository: String,
    /// Blob digest.
    digest: String,
}

#[async_trait]
impl Tool for FetchBlob {
    fn name(&self) -> &'static str {
        "fetch_blob"
    }

    fn title(&self) -> &'static str {
        "Fetch blob"
    }

    fn description(&self) -> &'static str {
        "Fetch blob referenced by a digest in a manifest."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(object_schema())
    }

    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        if input.registry.is_empty() || input.repository.is_empty() || input.digest.is_empty() {
            return Err(ToolError::invalid("registry, repository, and digest are required"));
        }
        validate_repository_name(&input.repository)?;
        let digest = Digest::parse(&input.digest)?;

        let client = self.remote.registry(&input.registry)?;
        let content = cancellable(&cancel, client.fetch_blob(&input.repository, &digest)).await?;

        Ok(serde_json::from_slice(&content)?)
    }
}
