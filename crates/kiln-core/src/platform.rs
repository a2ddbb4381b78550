//! Host platform detection

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Operating systems with toolchain defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    /// Detect the OS this binary was built for
    pub fn detect() -> Result<Self, ConfigError> {
        Self::parse(std::env::consts::OS)
    }

    /// Parse an OS name as reported by `std::env::consts::OS`
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(ConfigError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
