//! # OCI MCP Server
//!
//! Model Context Protocol server that lets an agent query OCI registries.
//!
//! The server speaks newline-delimited JSON-RPC 2.0 over stdio and exposes a
//! fixed set of read-only tools:
//!
//! | tool | purpose |
//! |------|---------|
//! | `list_wellknown_registries` | public registries with catalog support |
//! | `list_repositories` | repositories of a registry |
//! | `list_tags` | tags of a repository |
//! | `fetch_manifest` | manifest of an image or artifact |
//! | `fetch_blob` | JSON blob such as an image config |
//! | `parse_reference` | split a reference string into parts |
//! | `list_referrers` | referrer graph of an image or artifact |
//!
//! ## Example
//!
//! ```rust,no_run
//! use oci_mcp_registry::{ClientOptions, Remote};
//! use oci_mcp_server::{serve_stdio, Server, Toolbox};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = Remote::new(ClientOptions::default())?;
//!     let server = Server::new(Toolbox::new(&remote));
//!     serve_stdio(&server, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
pub mod protocol;
mod server;
pub mod tools;

pub use error::{Result, ServerError, ToolError};
pub use server::{serve_stdio, Server, SERVER_NAME, SERVER_TITLE};
pub use tools::{Tool, Toolbox};
