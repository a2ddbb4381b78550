//! Build file validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::BuildConfig;

/// Marker for targets that name no file
const ABSTRACT_PREFIX: char = ':';

/// Validate a build file.
///
/// Duplicate outputs are not checked here; the task registry rejects them
/// when the rules are registered.
pub fn validate_config(config: &BuildConfig) -> Result<()> {
    debug!("validating build file");
    validate_options(config)?;
    validate_copies(config)?;
    validate_cpp(config)?;
    validate_links(config)?;
    validate_commands(config)?;
    validate_aliases(config)?;
    debug!("build file validation passed");
    Ok(())
}

fn validate_options(config: &BuildConfig) -> Result<()> {
    if config.jobs == Some(0) {
        return Err(ConfigError::invalid("jobs", "must be at least 1").into());
    }

    for (i, target) in config.targets.iter().enumerate() {
        if target.is_empty() {
            return Err(ConfigError::invalid(format!("targets[{}]", i), "target cannot be empty").into());
        }
    }

    Ok(())
}

fn validate_copies(config: &BuildConfig) -> Result<()> {
    for (i, rule) in config.copy.iter().enumerate() {
        require_file(&format!("copy[{}].from", i), &rule.from)?;
        require_file(&format!("copy[{}].to", i), &rule.to)?;
    }
    Ok(())
}

fn validate_cpp(config: &BuildConfig) -> Result<()> {
    for (i, rule) in config.cpp.iter().enumerate() {
        require_file(&format!("cpp[{}].source", i), &rule.source)?;
        if let Some(object) = &rule.object {
            require_file(&format!("cpp[{}].object", i), object)?;
        }
    }
    Ok(())
}

fn validate_links(config: &BuildConfig) -> Result<()> {
    for (i, rule) in config.link.iter().enumerate() {
        if rule.objects.is_empty() {
            return Err(ConfigError::invalid(
                format!("link[{}].objects", i),
                "at least one object is required",
            )
            .into());
        }
        require_file(&format!("link[{}].output", i), &rule.output)?;
    }
    Ok(())
}

fn validate_commands(config: &BuildConfig) -> Result<()> {
    for (i, rule) in config.command.iter().enumerate() {
        if rule.target.is_empty() {
            return Err(ConfigError::invalid(format!("command[{}].target", i), "target cannot be empty").into());
        }
        if rule.command.first().map_or(true, |program| program.is_empty()) {
            return Err(ConfigError::invalid(format!("command[{}].command", i), "command cannot be empty").into());
        }
        for (j, written) in rule.writes.iter().enumerate() {
            require_file(&format!("command[{}].writes[{}]", i, j), written)?;
        }
    }
    Ok(())
}

fn validate_aliases(config: &BuildConfig) -> Result<()> {
    for (i, rule) in config.alias.iter().enumerate() {
        if !rule.name.starts_with(ABSTRACT_PREFIX) || rule.name.len() < 2 {
            return Err(ConfigError::invalid(
                format!("alias[{}].name", i),
                format!("must start with '{}' followed by a name", ABSTRACT_PREFIX),
            )
            .into());
        }
    }
    Ok(())
}

/// A file path field must be non-empty and must not look abstract
fn require_file(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "path cannot be empty").into());
    }
    if value.starts_with(ABSTRACT_PREFIX) {
        return Err(ConfigError::invalid(
            field,
            format!("'{}' is an abstract target name, not a file", value),
        )
        .into());
    }
    Ok(())
}
