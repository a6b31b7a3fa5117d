//! Docker `config.json` credential store.
//!
//! Credentials are read once when the store is loaded. Credential helpers
//! (`credsStore`, `credHelpers`) are not executed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::Deserialize;

use crate::config::RegistryAuth;
use crate::error::{RegistryError, Result};

/// Key under which Docker stores Docker Hub credentials.
const DOCKER_HUB_KEY: &str = "index.docker.io";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    creds_store: Option<String>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    identitytoken: Option<String>,
}

/// Registry credentials loaded from a Docker config file.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    auths: HashMap<String, AuthEntry>,
}

impl CredentialStore {
    /// Creates a store without any credentials.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads credentials from `path`, or from the default Docker config
    /// location when `path` is `None`.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            return Ok(Self::empty());
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No docker config found");
                return Ok(Self::empty());
            }
            Err(e) => {
                return Err(RegistryError::IoError { path, source: e });
            }
        };

        let file: DockerConfigFile =
            serde_json::from_str(&content).map_err(|e| RegistryError::CredentialError {
                message: format!("failed to parse {}: {e}", path.display()),
            })?;

        if file.creds_store.is_some() || !file.cred_helpers.is_empty() {
            tracing::debug!(
                path = %path.display(),
                "Docker credential helpers are configured but not executed"
            );
        }

        let auths = file
            .auths
            .into_iter()
            .map(|(key, entry)| (normalize_key(&key), entry))
            .collect();

        Ok(Self {
            path: Some(path),
            auths,
        })
    }

    /// Returns the file the store was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the credentials for `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored `auth` field is not valid base64 of
    /// `username:password`.
    pub fn get(&self, registry: &str) -> Result<RegistryAuth> {
        let Some(entry) = self.auths.get(&normalize_registry(registry)) else {
            return Ok(RegistryAuth::None);
        };

        if let Some(token) = entry.identitytoken.as_ref().filter(|t| !t.is_empty()) {
            return Ok(RegistryAuth::identity_token(token));
        }

        if let Some(auth) = entry.auth.as_ref().filter(|a| !a.is_empty()) {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(auth.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| RegistryError::CredentialError {
                    message: format!("invalid auth entry for {registry}"),
                })?;
            let (username, password) =
                decoded
                    .split_once(':')
                    .ok_or_else(|| RegistryError::CredentialError {
                        message: format!("invalid auth entry for {registry}"),
                    })?;
            return Ok(RegistryAuth::basic(username, password));
        }

        match (&entry.username, &entry.password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Ok(RegistryAuth::basic(username, password))
            }
            _ => Ok(RegistryAuth::None),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

/// Strips scheme and path from a config key, e.g.
/// `https://index.docker.io/v1/` → `index.docker.io`.
fn normalize_key(key: &str) -> String {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = key.split('/').next().unwrap_or(key);
    normalize_registry(host)
}

fn normalize_registry(registry: &str) -> String {
    match registry {
        "docker.io" | "registry-1.docker.io" | "index.docker.io" => DOCKER_HUB_KEY.to_string(),
        other => other.to_string(),
    }
}
