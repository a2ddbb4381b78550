//! Copy rule

use async_trait::async_trait;
use kiln_core::config::CopyRule;
use kiln_tasks::{
    BuildError, ConfigError, Engine, ProcessRunner, TargetId, Task, TaskAction, TaskError,
    MISSING_HASH,
};
use tracing::debug;

use crate::ensure_parent;

/// Copies one file, creating the destination directory first
#[derive(Debug, Clone)]
pub struct CopyAction {
    from: String,
    to: String,
}

impl CopyAction {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn error(&self, source: std::io::Error) -> BuildError {
        BuildError::Copy {
            from: self.from.clone(),
            to: self.to.clone(),
            source,
        }
    }
}

#[async_trait]
impl TaskAction for CopyAction {
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError> {
        let hashes = runner.hashes();
        let source_hash = hashes.hash_file(&self.from).await;
        if source_hash != MISSING_HASH && source_hash == hashes.hash_file(&self.to).await {
            debug!(to = %self.to, "copy destination already up to date");
            return Ok(());
        }

        ensure_parent(&self.to).await.map_err(|e| match e {
            BuildError::Io(source) => self.error(source),
            other => other,
        })?;
        tokio::fs::copy(&self.from, &self.to)
            .await
            .map_err(|e| self.error(e))?;

        hashes.invalidate(&self.to);
        Ok(())
    }
}

/// Register a task copying `rule.from` to `rule.to`
pub fn register(engine: &mut Engine, rule: &CopyRule) -> Result<TargetId, ConfigError> {
    let task = Task::new(
        rule.to.as_str(),
        format!("COPY {}", rule.to),
        CopyAction::new(&rule.from, &rule.to),
    )
    .with_dependency(rule.from.as_str());
    engine.register(task)
}
