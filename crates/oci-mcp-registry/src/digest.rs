//! Content digests.
//!
//! A digest has the form `algorithm:encoded`. Only the registered `sha256`
//! and `sha512` algorithms are accepted, and their encoded part must be
//! lowercase hex of the exact length.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::{RegistryError, Result};

/// A validated content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// The SHA-256 algorithm identifier.
    pub const SHA256: &'static str = "sha256";

    /// The SHA-512 algorithm identifier.
    pub const SHA512: &'static str = "sha512";

    /// Parses and validates a digest string.
    ///
    /// # Examples
    ///
    /// ```
    /// use oci_mcp_registry::Digest;
    ///
    /// let digest = Digest::parse(
    ///     "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
    /// ).unwrap();
    /// assert_eq!(digest.algorithm(), "sha256");
    ///
    /// assert!(Digest::parse("sha256:zzzz").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the string is malformed or
    /// uses an unsupported algorithm.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| RegistryError::InvalidDigest {
            digest: input.to_string(),
            reason: reason.to_string(),
        };

        let (algorithm, encoded) = input
            .split_once(':')
            .ok_or_else(|| invalid("missing algorithm separator"))?;

        if !is_valid_algorithm(algorithm) {
            return Err(invalid("invalid algorithm"));
        }
        if encoded.is_empty()
            || !encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
        {
            return Err(invalid("invalid encoded portion"));
        }

        let expected_len = match algorithm {
            Self::SHA256 => 64,
            Self::SHA512 => 128,
            _ => return Err(invalid("unsupported algorithm")),
        };
        if encoded.len() != expected_len
            || !encoded.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("invalid checksum digest length or format"));
        }

        Ok(Self(input.to_string()))
    }

    /// Computes the SHA-256 digest of the given content.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(format!("{}:{}", Self::SHA256, hex::encode(Sha256::digest(data))))
    }

    /// Returns the digest algorithm (e.g., "sha256").
    #[must_use]
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map_or("", |(alg, _)| alg)
    }

    /// Returns the encoded portion (without algorithm prefix).
    #[must_use]
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, enc)| enc)
    }

    /// Returns the digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Computes the digest of `data` with this digest's algorithm.
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> Self {
        match self.algorithm() {
            Self::SHA512 => Self(format!("{}:{}", Self::SHA512, hex::encode(Sha512::digest(data)))),
            _ => Self::from_bytes(data),
        }
    }

    /// Returns true if `data` hashes to this digest.
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        self.compute(data) == *self
    }

    /// Returns the tag under which the referrers tag schema stores the
    /// referrers index for this digest (`algorithm-encoded`).
    #[must_use]
    pub fn as_tag(&self) -> String {
        format!("{}-{}", self.algorithm(), self.encoded())
    }
}

/// Checks `[a-z0-9]+([+._-][a-z0-9]+)*`.
fn is_valid_algorithm(algorithm: &str) -> bool {
    algorithm
        .split(['+', '.', '_', '-'])
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
