//! Query tools exposed to the agent.
//!
//! Every tool is read-only. Arguments are validated before any registry
//! access, and every registry call is raced against the invocation's
//! cancellation token.

mod blob;
mod manifest;
mod reference;
mod referrers;
mod repository;
mod tags;
mod wellknown;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use oci_mcp_registry::{Reference, Remote, TagOrDigest};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::protocol::{ToolAnnotations, ToolDefinition};

pub use blob::FetchBlob;
pub use manifest::FetchManifest;
pub use reference::ParseReference;
pub use referrers::ListReferrers;
pub use repository::ListRepositories;
pub use tags::ListTags;
pub use wellknown::ListWellknownRegistries;

/// A tool callable through `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &'static str;

    /// Display name.
    fn title(&self) -> &'static str;

    /// What the tool does, as shown to the agent.
    fn description(&self) -> &'static str;

    /// JSON Schema of the arguments.
    fn input_schema(&self) -> Value;

    /// JSON Schema of the structured output, if constrained.
    fn output_schema(&self) -> Option<Value>;

    /// Runs the tool.
    async fn call(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError>;

    /// Returns the definition advertised by `tools/list`.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            title: self.title().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            annotations: ToolAnnotations {
                read_only_hint: true,
                open_world_hint: true,
            },
        }
    }
}

/// The set of tools served, keyed by name.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl Toolbox {
    /// Creates a toolbox with every registry tool, sharing one transport.
    #[must_use]
    pub fn new(remote: &Remote) -> Self {
        let mut toolbox = Self::default();
        toolbox.register(ListWellknownRegistries);
        toolbox.register(ListRepositories::new(remote.clone()));
        toolbox.register(ListTags::new(remote.clone()));
        toolbox.register(FetchManifest::new(remote.clone()));
        toolbox.register(FetchBlob::new(remote.clone()));
        toolbox.register(ParseReference);
        toolbox.register(ListReferrers::new(remote.clone()));
        toolbox
    }

    /// Adds a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns the definitions of all tools, ordered by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Returns the number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Renders the JSON Schema of a type.
pub(crate) fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| object_schema())
}

/// Schema accepting any JSON object.
pub(crate) fn object_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Decodes tool arguments; a missing argument object is treated as empty.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::invalid(format!("invalid arguments: {e}")))
}

/// Runs a registry operation unless the invocation is cancelled first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, ToolError>
where
    F: Future<Output = oci_mcp_registry::Result<T>> + Send,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ToolError::Cancelled),
        result = operation => result.map_err(ToolError::from),
    }
}

/// Builds the manifest reference addressed by tool input.
///
/// Registry and repository are required, and at least one of tag or digest.
/// A digest takes priority over a tag.
pub(crate) fn target_reference(
    registry: &str,
    repository: &str,
    tag: Option<&str>,
    digest: Option<&str>,
) -> Result<(Reference, TagOrDigest), ToolError> {
    if registry.is_empty() || repository.is_empty() {
        return Err(ToolError::invalid("registry and repository names are required"));
    }
    let tag = tag.filter(|t| !t.is_empty());
    let digest = digest.filter(|d| !d.is_empty());
    if tag.is_none() && digest.is_none() {
        return Err(ToolError::invalid("either tag or digest is required"));
    }

    let mut reference = Reference::from_parts(registry, repository, tag, digest)?;
    let target = reference
        .reference
        .take()
        .ok_or_else(|| ToolError::invalid("either tag or digest is required"))?;
    Ok((reference, target))
}

#[cfg(test)]
pub(crate) mod testing {
    use oci_mcp_registry::{ClientOptions, CredentialStore, Remote};

    /// A transport that never touches a real credential file.
    pub fn remote() -> Remote {
        Remote::with_credentials(ClientOptions::default(), CredentialStore::empty())
            .expect("transport builds")
    }
}
