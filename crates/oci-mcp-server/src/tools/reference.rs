use async_trait::async_trait;
use oci_mcp_registry::Reference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{parse_args, schema_of, Tool};
use crate::error::ToolError;

/// Splits a reference string into its parts without contacting a registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseReference;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct Input {
    /// Reference string, e.g. `ghcr.io/oras-project/oras:v1.2.0`.
    reference: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct Output {
    /// Registry name.
    registry: String,
    /// Repository name.
    repository: String,
    /// Tag name.
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    /// Manifest digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

impl From<Reference> for Output {
    fn from(reference: Reference) -> Self {
        Self {
            tag: reference.tag().map(str::to_string),
            digest: reference.digest().map(ToString::to_string),
            registry: reference.registry,
            repository: reference.repository,
        }
    }
}

#[async_trait]
impl Tool for ParseReference {
    fn name(&self) -> &'static str {
        "parse_reference"
    }

    fn title(&self) -> &'static str {
        "Parse reference"
    }

    fn description(&self) -> &'static str {
        "Parse a reference string into its components of registry, repository, tag, and digest."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_of::<Output>())
    }

    async fn call(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let input: Input = parse_args(args)?;
        if input.reference.is_empty() {
            return Err(ToolError::invalid("reference string is required"));
        }

        let reference = Reference::parse(&input.reference)?;
        Ok(serde_json::to_value(Output::from(reference))?)
    }
}
