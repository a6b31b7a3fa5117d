use async_trait::async_trait;
use oci_mcp_registry::Remote;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{cancellable, object_schema, parse_args, schema_of, target_reference, Tool};
use crate::error::ToolError;

/// Fetches an image or artifact manifest.
#[derive(Debug, Clone)]
pub struct FetchManifest {
    remote: Remote,
}

impl FetchManifest {
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
    /// Tag name.
    tag: Option<String>,
    /// Manifest digest.
    digest: Option<String>,
}

#[async_trait]
impl Tool for FetchManifest {
    fn name(&self) -> &'static str {
        "fetch_manifest"
    }

    fn title(&self) -> &'static str {
        "Fetch manifest"
    }

    fn description(&self) -> &'static str {
        "Fetch manifest of a container image or an OCI artifact."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(object_schema())
    }

    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        let (reference, target) = target_reference(
            &input.registry,
            &input.repository,
            input.tag.as_deref(),
            input.digest.as_deref(),
        )?;

        let client = self.remote.registry(&reference.registry)?;
        let (descriptor, content) =
            cancellable(&cancel, client.fetch_manifest(&reference.repository, &target)).await?;
        tracing::debug!(
            reference = %reference,
            digest = %descriptor.digest,
            media_type = %descriptor.media_type.as_str(),
            "Fetched manifest"
        );

        Ok(serde_json::from_slice(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use serde_json::json;

    #[tokio::test]
    async fn test_tag_or_digest_required() {
        let tool = FetchManifest::new(testing::remote());
        let err = tool
            .call(
                json!({"registry": "localhost:5000", "repository": "hello"}),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "either tag or digest is required");
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let tool = FetchManifest::new(testing::remote());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tool
            .call(
                json!({"registry": "localhost:5000", "repository": "hello", "tag": "v1"}),
                cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
