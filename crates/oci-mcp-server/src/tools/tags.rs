use async_trait::async_trait;
use oci_mcp_registry::{validate_repository_name, Remote};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{cancellable, parse_args, schema_of, Tool};
use crate::error::ToolError;

/// Lists the tags of one repository.
#[derive(Debug, Clone)]
pub struct ListTags {
    remote: Remote,
}

impl ListTags {
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
}

#[derive(Debug, Serialize, JsonSchema)]
struct Output {
    /// List of tags.
    tags: Vec<String>,
}

#[async_trait]
impl Tool for ListTags {
    fn name(&self) -> &'static str {
        "list_tags"
    }

    fn title(&self) -> &'static str {
        "List tags"
    }

    fn description(&self) -> &'static str {
        "List tags in a repository of a container registry."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_of::<Output>())
    }

    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        if input.registry.is_empty() || input.repository.is_empty() {
            return Err(ToolError::invalid("registry and repository names are required"));
        }
        validate_repository_name(&input.repository)?;

        let client = self.remote.registry(&input.registry)?;
        let tags = cancellable(&cancel, client.list_tags(&input.repository)).await?;

        Ok(serde_json::to_value(Output { tags })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use serde_json::json;

    #[tokio::test]
    async fn test_names_required() {
        let tool = ListTags::new(testing::remote());
        let err = tool
            .call(json!({"registry": "localhost:5000"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "registry and repository names are required");
    }

    #[tokio::test]
    async fn test_invalid_repository_rejected() {
        let tool = ListTags::new(testing::remote());
        let err = tool
            .call(
                json!({"registry": "localhost:5000", "repository": "Hello"}),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Registry(_)));
    }
}
