//! Generic command rule

use async_trait::async_trait;
use kiln_core::config::CommandRule;
use kiln_tasks::{ConfigError, Engine, ProcessRunner, TargetId, Task, TaskAction, TaskError, Tracked};

use crate::ensure_parent;

/// Runs one command, cached on its declared reads and writes
#[derive(Debug, Clone)]
pub struct CommandAction {
    command: Vec<String>,
    label: String,
    reads: Vec<String>,
    writes: Vec<String>,
    cache: bool,
}

#[async_trait]
impl TaskAction for CommandAction {
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError> {
        for written in &self.writes {
            ensure_parent(written).await?;
        }

        if !self.cache {
            return runner.run_uncached(&self.command, &self.label).await;
        }

        let tracked = Tracked::new(self.reads.clone(), self.writes.clone());
        runner
            .run(&self.command, &self.label, move || async move { Ok(tracked) })
            .await
    }
}

/// Register a task running `rule.command` to produce `rule.target`.
///
/// Declared reads are also dependencies, so each is built or checked for
/// existence before the command runs.
pub fn register(engine: &mut Engine, rule: &CommandRule) -> Result<TargetId, ConfigError> {
    let label = rule
        .label
        .clone()
        .unwrap_or_else(|| format!("RUN {}", rule.target));

    let mut depends = rule.depends.clone();
    for read in &rule.reads {
        if !depends.contains(read) {
            depends.push(read.clone());
        }
    }

    let action = CommandAction {
        command: rule.command.clone(),
        label: label.clone(),
        reads: rule.reads.clone(),
        writes: rule.writes.clone(),
        cache: rule.cache,
    };

    engine.register(Task::new(rule.target.as_str(), label, action).with_dependencies(depends))
}
