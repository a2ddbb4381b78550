//! Build file types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::platform::Os;

use super::defaults::default_toolchain;

/// Contents of a build file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Job limit (defaults to available parallelism + 1)
    pub jobs: Option<usize>,

    /// Cache file location, relative to the build file
    pub cache_file: Option<PathBuf>,

    /// Targets built when none are given on the command line
    pub targets: Vec<String>,

    /// Per-OS toolchain overrides
    pub toolchain: ToolchainConfig,

    /// File copies
    pub copy: Vec<CopyRule>,

    /// C++ compilations
    pub cpp: Vec<CppRule>,

    /// Executable links
    pub link: Vec<LinkRule>,

    /// Arbitrary commands
    pub command: Vec<CommandRule>,

    /// Abstract targets grouping other targets
    pub alias: Vec<AliasRule>,
}

/// Toolchain overrides, one table per OS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub linux: ToolchainOverrides,
    pub macos: ToolchainOverrides,
    pub windows: ToolchainOverrides,
}

impl ToolchainConfig {
    /// Apply the overrides for `os` on top of its defaults
    pub fn resolve(&self, os: Os) -> Toolchain {
        let overrides = match os {
            Os::Linux => &self.linux,
            Os::MacOs => &self.macos,
            Os::Windows => &self.windows,
        };
        overrides.apply(default_toolchain(os))
    }
}

/// Optional replacements for individual toolchain settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainOverrides {
    pub cpp: Option<Vec<String>>,
    pub cpp_flags: Option<Vec<String>>,
    pub link: Option<Vec<String>>,
    pub link_libs: Option<Vec<String>>,
    pub obj_prefix: Option<String>,
    pub obj_suffix: Option<String>,
    pub exe_suffix: Option<String>,
}

impl ToolchainOverrides {
    fn apply(&self, base: Toolchain) -> Toolchain {
        Toolchain {
            cpp: self.cpp.clone().unwrap_or(base.cpp),
            cpp_flags: self.cpp_flags.clone().unwrap_or(base.cpp_flags),
            link: self.link.clone().unwrap_or(base.link),
            link_libs: self.link_libs.clone().unwrap_or(base.link_libs),
            obj_prefix: self.obj_prefix.clone().unwrap_or(base.obj_prefix),
            obj_suffix: self.obj_suffix.clone().unwrap_or(base.obj_suffix),
            exe_suffix: self.exe_suffix.clone().unwrap_or(base.exe_suffix),
        }
    }
}

/// Resolved compiler and linker settings for one OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Compiler and leading flags
    pub cpp: Vec<String>,
    /// Extra compile flags, appended after `cpp`
    pub cpp_flags: Vec<String>,
    /// Linker and leading flags
    pub link: Vec<String>,
    /// Libraries, appended after the objects
    pub link_libs: Vec<String>,
    /// Prefix for derived object paths
    pub obj_prefix: String,
    pub obj_suffix: String,
    pub exe_suffix: String,
}

/// Copy `from` to `to`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRule {
    pub from: String,
    pub to: String,
}

/// Compile one C++ source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CppRule {
    pub source: String,

    /// Object path without suffix (derived from `source` when absent)
    #[serde(default)]
    pub object: Option<String>,

    /// Extra dependencies, e.g. generated headers
    #[serde(default)]
    pub depends: Vec<String>,
}

/// Link objects into an executable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRule {
    pub objects: Vec<String>,

    /// Executable path without suffix
    pub output: String,

    #[serde(default)]
    pub depends: Vec<String>,
}

/// Run an arbitrary command to produce a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRule {
    pub target: String,

    #[serde(default)]
    pub label: Option<String>,

    pub command: Vec<String>,

    #[serde(default)]
    pub depends: Vec<String>,

    /// Files the command reads, tracked for caching
    #[serde(default)]
    pub reads: Vec<String>,

    /// Files the command writes, tracked for caching
    #[serde(default)]
    pub writes: Vec<String>,

    /// Skip the command when its tracked files are unchanged
    #[serde(default = "default_true")]
    pub cache: bool,
}

/// Abstract target standing for a group of other targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRule {
    pub name: String,
    pub depends: Vec<String>,
}

fn default_true() -> bool {
    true
}
