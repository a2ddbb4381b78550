//! Registration of every rule in a build file

use kiln_core::{BuildConfig, Os};
use kiln_tasks::{ConfigError, Engine, TargetId, Task};
use tracing::{info, instrument};

use crate::{command, copy, cpp, link, Platform};

/// Register all rules of `config` on `engine` for `os`.
///
/// Returns the registered targets in build file order (copies, compiles,
/// links, commands, then aliases). Stops at the first duplicate target.
#[instrument(skip_all, fields(os = %os))]
pub fn register_build_file(
    engine: &mut Engine,
    config: &BuildConfig,
    os: Os,
) -> Result<Vec<TargetId>, ConfigError> {
    let platform = Platform::new(os, config.toolchain.resolve(os));
    let mut registered = Vec::new();

    for rule in &config.copy {
        registered.push(copy::register(engine, rule)?);
    }
    for rule in &config.cpp {
        registered.push(cpp::register(engine, &platform, rule)?);
    }
    for rule in &config.link {
        registered.push(link::register(engine, &platform, rule)?);
    }
    for rule in &config.command {
        registered.push(command::register(engine, rule)?);
    }
    for rule in &config.alias {
        let task = Task::from_fn(rule.name.as_str(), rule.name.as_str(), |_runner| async {
            Ok(())
        })
        .with_dependencies(rule.depends.iter().map(String::as_str));
        registered.push(engine.register(task)?);
    }

    info!(count = registered.len(), "registered build file rules");
    Ok(registered)
}
