use async_trait::async_trait;
use oci_mcp_registry::Remote;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{cancellable, parse_args, schema_of, Tool};
use crate::error::ToolError;

/// Lists repositories through the catalog API.
#[derive(Debug, Clone)]
pub struct ListRepositories {
    remote: Remote,
}

impl ListRepositories {
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
}

#[derive(Debug, Serialize, JsonSchema)]
struct Output {
    /// List of repositories.
    repositories: Vec<String>,
}

#[async_trait]
impl Tool for ListRepositories {
    fn name(&self) -> &'static str {
        "list_repositories"
    }

    fn title(&self) -> &'static str {
        "List repositories"
    }

    fn description(&self) -> &'static str {
        "List repositories of a container registry."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_of::<Output>())
    }

    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        if input.registry.is_empty() {
            return Err(ToolError::invalid("registry name is required"));
        }

        let client = self.remote.registry(&input.registry)?;
        let repositories = cancellable(&cancel, client.list_repositories()).await?;
        tracing::debug!(registry = %input.registry, count = repositories.len(), "Listed repositories");

        Ok(serde_json::to_value(Output { repositories })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_required() {
        let tool = ListRepositories::new(testing::remote());
        let err = tool.call(json!({}), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "registry name is required");
    }

    #[tokio::test]
    async fn test_invalid_registry_rejected() {
        let tool = ListRepositories::new(testing::remote());
        let err = tool
            .call(json!({"registry": "bad host/x"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid reference format"));
    }
}
