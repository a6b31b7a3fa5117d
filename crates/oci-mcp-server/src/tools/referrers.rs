use async_trait::async_trait;
use oci_mcp_registry::{resolve_referrers, ReferrerNode, Remote};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{cancellable, parse_args, schema_of, target_reference, Tool};
use crate::error::ToolError;

/// Resolves the full graph of artifacts referring to a manifest.
#[derive(Debug, Clone)]
pub struct ListReferrers {
    remote: Remote,
}

impl ListReferrers {
    /// Creates the tool over a shared transport.
    #[must_use]
    pub const fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
struct Input {
    /// Registry name.
    registry: String,
    /// Repository name.
    repository: String,
    /// Tag name.
    tag: Option<String>,
    /// Manifest digest.
    digest: Option<String>,
    /// Only list referrers of this artifact type.
    artifact_type: Option<String>,
}

#[async_trait]
impl Tool for ListReferrers {
    fn name(&self) -> &'static str {
        "list_referrers"
    }

    fn title(&self) -> &'static str {
        "List referrers"
    }

    fn description(&self) -> &'static str {
        "List referrers of a container image or an OCI artifact."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_of::<ReferrerNode>())
    }

    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        let (reference, target) = target_reference(
            &input.registry,
            &input.repository,
            input.tag.as_deref(),
            input.digest.as_deref(),
        )?;
        let artifact_type = input.artifact_type.as_deref().filter(|t| !t.is_empty());

        let repository = self.remote.repository(&reference)?;
        let root = cancellable(&cancel, repository.resolve(&target)).await?;

        let tree = resolve_referrers(&root, artifact_type, &repository, &cancel).await?;
        Ok(serde_json::to_value(tree)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use serde_json::json;

    #[tokio::test]
    async fn test_names_required() {
        let tool = ListReferrers::new(testing::remote());
        let err = tool
            .call(json!({"repository": "hello", "tag": "v1"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "registry and repository names are required");
    }

    #[tokio::test]
    async fn test_tag_or_digest_required() {
        let tool = ListReferrers::new(testing::remote());
        let err = tool
            .call(
                json!({"registry": "localhost:5000", "repository": "hello", "artifactType": "application/sbom"}),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "either tag or digest is required");
    }
}
