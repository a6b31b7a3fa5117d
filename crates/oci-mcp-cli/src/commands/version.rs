//! Version command implementation.

use std::fmt;

/// Build information embedded at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Semantic version.
    pub version: &'static str,
    /// Optional build metadata appended as `+<metadata>`.
    pub build_metadata: Option<&'static str>,
    /// Commit the binary was built from.
    pub git_commit: Option<&'static str>,
    /// `clean` or `dirty`.
    pub git_tree_state: Option<&'static str>,
}

impl VersionInfo {
    /// Returns the information of the running binary.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_metadata: option_env!("OCI_MCP_BUILD_METADATA").filter(|m| !m.is_empty()),
            git_commit: option_env!("OCI_MCP_GIT_COMMIT").filter(|c| !c.is_empty()),
            git_tree_state: option_env!("OCI_MCP_GIT_TREE_STATE").filter(|s| !s.is_empty()),
        }
    }

    /// Returns the version with build metadata, e.g. `0.1.0+nightly`.
    #[must_use]
    pub fn full_version(&self) -> String {
        match self.build_metadata {
            Some(metadata) => format!("{}+{metadata}", self.version),
            None => self.version.to_string(),
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:        {}", self.full_version())?;
        if let Some(commit) = self.git_commit {
            writeln!(f, "Git commit:     {commit}")?;
        }
        if let Some(state) = self.git_tree_state {
            writeln!(f, "Git tree state: {state}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includes_metadata() {
        let info = VersionInfo {
            version: "1.2.3",
            build_metadata: Some("nightly"),
            git_commit: Some("abc1234"),
            git_tree_state: Some("dirty"),
        };

        let output = info.to_string();
        assert!(output.contains("Version:        1.2.3+nightly"));
        assert!(output.contains("Git commit:     abc1234"));
        assert!(output.contains("Git tree state: dirty"));
    }

    #[test]
    fn test_omits_unknown_fields() {
        let info = VersionInfo {
            version: "1.2.3",
            build_metadata: None,
            git_commit: None,
            git_tree_state: None,
        };

        assert_eq!(info.to_string(), "Version:        1.2.3\n");
    }

    #[test]
    fn test_current_uses_package_version() {
        assert_eq!(VersionInfo::current().version, env!("CARGO_PKG_VERSION"));
    }
}
