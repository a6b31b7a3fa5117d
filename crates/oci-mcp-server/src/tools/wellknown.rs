use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{parse_args, schema_of, Tool};
use crate::error::ToolError;

/// Registries known to serve the catalog API publicly.
const WELLKNOWN: &[(&str, &str)] = &[("mcr.microsoft.com", "Microsoft Container Registry")];

/// Lists public registries whose repositories can be enumerated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListWellknownRegistries;

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct Input {}

#[derive(Debug, Serialize, JsonSchema)]
struct Output {
    /// List of well-known registries.
    registries: Vec<Registry>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct Registry {
    name: String,
    description: String,
}

#[async_trait]
impl Tool for ListWellknownRegistries {
    fn name(&self) -> &'static str {
        "list_wellknown_registries"
    }

    fn title(&self) -> &'static str {
        "List well-known registries"
    }

    fn description(&self) -> &'static str {
        "List well-known public registries with catalog support."
    }

    fn input_schema(&self) -> Value {
        schema_of::<Input>()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_of::<Output>())
    }

    async fn call(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let Input {} = parse_args(args)?;
        let output = Output {
            registries: WELLKNOWN
                .iter()
                .map(|(name, description)| Registry {
                    name: (*name).to_string(),
                    description: (*description).to_string(),
                })
                .collect(),
        };
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lists_mcr() {
        let output = ListWellknownRegistries
            .call(json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            output,
            json!({"registries": [{"name": "mcr.microsoft.com", "description": "Microsoft Container Registry"}]})
        );
    }
}
