//! Optional TOML profile
//!
//! A profile saves repeating the port and secret file names on every
//! invocation:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! timeout_ms = 2000
//! ack_timeout_ms = 2000
//!
//! [secrets]
//! build = "secret_build_output.txt"
//! field = "secret_configure_output.txt"
//! ```
//!
//! Every field is optional. Command line flags override the profile and the
//! profile overrides the built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::string::String;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_TIMEOUT_MS;

/// Default serial baud rate
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default build secret file
pub const DEFAULT_BUILD_SECRETS: &str = "secret_build_output.txt";

/// Default field-configuration secret file
pub const DEFAULT_FIELD_SECRETS: &str = "secret_configure_output.txt";

/// Serial port settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialProfile {
    /// Serial device path
    pub port: Option<String>,
    /// Baud rate
    pub baud: Option<u32>,
    /// Per-read timeout in milliseconds
    pub timeout_ms: Option<u32>,
    /// Frame acknowledgment timeout in milliseconds
    pub ack_timeout_ms: Option<u32>,
}

/// Secret file locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsProfile {
    /// Build secret file
    pub build: Option<PathBuf>,
    /// Field-configuration secret file
    pub field: Option<PathBuf>,
}

/// A loaded profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    /// `[serial]` table
    pub serial: SerialProfile,
    /// `[secrets]` table
    pub secrets: SecretsProfile,
}

/// Errors from loading a profile
#[derive(Debug)]
pub enum ProfileError {
    /// The file could not be read
    Io(std::io::Error),
    /// The file is not a valid profile
    Parse(toml::de::Error),
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read profile: {}", e),
            Self::Parse(e) => write!(f, "invalid profile: {}", e),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl Profile {
    /// Parse a profile from TOML text
    pub fn parse(text: &str) -> Result<Self, ProfileError> {
        toml::from_str(text).map_err(ProfileError::Parse)
    }

    /// Load a profile from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(ProfileError::Io)?;
        let profile = Self::parse(&text)?;
        log::debug!("Loaded profile {}", path.display());
        Ok(profile)
    }

    /// Baud rate, or the default
    pub fn baud(&self) -> u32 {
        self.serial.baud.unwrap_or(DEFAULT_BAUD)
    }

    /// Per-read timeout, or the default
    pub fn timeout_ms(&self) -> u32 {
        self.serial.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Frame acknowledgment timeout, or the default
    pub fn ack_timeout_ms(&self) -> u32 {
        self.serial.ack_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Build secret file, or the default
    pub fn build_secrets(&self) -> PathBuf {
        self.secrets
            .build
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_SECRETS))
    }

    /// Field-configuration secret file, or the default
    pub fn field_secrets(&self) -> PathBuf {
        self.secrets
            .field
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIELD_SECRETS))
    }
}
