//! Serve command implementation.
//!
//! Runs the MCP server on stdin/stdout until the client closes stdin or the
//! process receives Ctrl-C.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use oci_mcp_registry::{ClientOptions, Remote, TlsConfig};
use oci_mcp_server::{serve_stdio, Server, Toolbox};

use super::version::VersionInfo;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Registry to contact over plain HTTP (repeatable, comma separated)
    #[arg(
        long = "plain-http",
        value_name = "REGISTRY",
        env = "OCI_MCP_PLAIN_HTTP",
        value_delimiter = ','
    )]
    pub plain_http: Vec<String>,

    /// Docker config file, or the directory containing `config.json`
    #[arg(long, value_name = "PATH", env = "DOCKER_CONFIG")]
    pub docker_config: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Additional CA certificate (PEM) to trust
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,
}

/// Executes the serve command.
///
/// # Errors
///
/// Returns an error if:
/// - The Docker config file is malformed
/// - The CA certificate cannot be loaded
/// - Stdin or stdout fail
pub async fn execute(args: ServeArgs) -> Result<()> {
    let options = client_options(&args);
    let remote = Remote::new(options).context("Failed to set up registry transport")?;

    let version = VersionInfo::current().full_version();
    let server = Server::new(Toolbox::new(&remote)).with_version(&version);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    info!(version = %version, "Serving on stdio");
    serve_stdio(&server, shutdown)
        .await
        .context("MCP server failed")?;

    Ok(())
}

/// Builds client options from the command-line flags.
fn client_options(args: &ServeArgs) -> ClientOptions {
    let mut options = ClientOptions::default().with_timeout(Duration::from_secs(args.timeout));

    for registry in args.plain_http.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        options = options.with_plain_http_registry(registry);
    }

    if let Some(ref path) = args.docker_config {
        options = options.with_docker_config(config_file(path));
    }

    if args.insecure || args.ca_cert.is_some() {
        let mut tls = TlsConfig::new();
        if let Some(ref ca_cert) = args.ca_cert {
            tls = tls.with_ca_cert(ca_cert);
        }
        if args.insecure {
            warn!("TLS certificate verification is disabled");
            tls = tls.insecure();
        }
        options = options.with_tls(tls);
    }

    options
}

/// Resolves a Docker config directory to the file inside it.
fn config_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join("config.json")
    } else {
        path.to_path_buf()
    }
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ServeArgs {
        ServeArgs {
            timeout: 30,
            plain_http: Vec::new(),
            docker_config: None,
            insecure: false,
            ca_cert: None,
        }
    }

    #[test]
    fn test_default_options() {
        let options = client_options(&args());
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.plain_http_registries.is_empty());
        assert!(options.tls.is_none());
        assert!(options.docker_config.is_none());
    }

    #[test]
    fn test_plain_http_registries() {
        let options = client_options(&ServeArgs {
            plain_http: vec!["registry.local:5000".to_string(), " ".to_string()],
            ..args()
        });
        assert_eq!(options.plain_http_registries, vec!["registry.local:5000"]);
    }

    #[test]
    fn test_tls_flags() {
        let options = client_options(&ServeArgs {
            insecure: true,
            ca_cert: Some(PathBuf::from("/etc/ssl/ca.pem")),
            ..args()
        });
        let tls = options.tls.unwrap();
        assert!(tls.insecure_skip_verify);
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/etc/ssl/ca.pem")));
    }

    #[test]
    fn test_docker_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let options = client_options(&ServeArgs {
            docker_config: Some(dir.path().to_path_buf()),
            ..args()
        });
        assert_eq!(options.docker_config, Some(dir.path().join("config.json")));

        let file = dir.path().join("auth.json");
        std::fs::write(&file, "{}").unwrap();
        assert_eq!(config_file(&file), file);
    }
}
