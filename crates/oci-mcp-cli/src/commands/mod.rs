//! CLI commands and argument parsing.

pub mod serve;
pub mod version;

use clap::{Parser, Subcommand};

/// oci-mcp - disclose OCI registry metadata to agents over MCP
#[derive(Parser)]
#[command(name = "oci-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the MCP server on stdio
    Serve(serve::ServeArgs),

    /// Print version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_rejects_positional_args() {
        assert!(Cli::try_parse_from(["oci-mcp", "serve", "extra"]).is_err());
    }

    #[test]
    fn test_version_subcommand() {
        let cli = Cli::try_parse_from(["oci-mcp", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }
}
