//! Target identifiers and task descriptors

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::runner::ProcessRunner;

/// Leading character of an abstract target
pub const ABSTRACT_PREFIX: char = ':';

/// Name of a buildable thing: a posix-style file path or an abstract `:label`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Create a new target ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Abstract targets name no file and must have a registered task
    pub fn is_abstract(&self) -> bool {
        self.0.starts_with(ABSTRACT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TargetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The work a task performs.
///
/// Actions see nothing of the scheduler beyond success or failure. They
/// usually call [`ProcessRunner::run`] one or more times.
#[async_trait]
pub trait TaskAction: Send + Sync {
    /// Perform the work
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError>;
}

/// Adapter turning a closure into a [`TaskAction`]
pub struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(ProcessRunner) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError> {
        (self.0)(runner).await
    }
}

/// One unit of buildable work
#[derive(Clone)]
pub struct Task {
    /// Target this task produces
    pub id: TargetId,
    /// Human-readable description (logging only)
    pub label: String,
    /// Targets that must reach a terminal state first
    pub dependencies: Vec<TargetId>,
    action: Arc<dyn TaskAction>,
}

impl Task {
    /// Create a new task
    pub fn new(
        id: impl Into<TargetId>,
        label: impl Into<String>,
        action: impl TaskAction + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            dependencies: Vec::new(),
            action: Arc::new(action),
        }
    }

    /// Create a task whose action is a closure
    pub fn from_fn<F, Fut>(id: impl Into<TargetId>, label: impl Into<String>, f: F) -> Self
    where
        F: Fn(ProcessRunner) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::new(id, label, FnAction(f))
    }

    /// Add a dependency
    pub fn with_dependency(mut self, dep: impl Into<TargetId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Add several dependencies, keeping their order
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Shared handle to the action
    pub fn action(&self) -> Arc<dyn TaskAction> {
        Arc::clone(&self.action)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
