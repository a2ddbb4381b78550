//! Build file loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::BuildConfig;
use super::validation::validate_config;

/// Load a build file, choosing the parser by extension
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    let format = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        "YAML"
    } else {
        "TOML"
    };
    info!(path = %path.display(), format, "loading build file");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: BuildConfig = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "build file loaded and validated");
    Ok(config)
}

/// Find a build file in a directory or its parents.
///
/// Names are tried in [`config_file_names`] order at each level; the first
/// match wins.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for build file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.is_file() {
                info!(path = %config_path.display(), "found build file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no build file found");
    None
}

/// Load the build file for a directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(BuildConfig, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}
