//! Error kinds for the build engine
//!
//! Every failure the engine can see falls into one of three kinds, and the
//! kind alone decides how far it propagates:
//!
//! - [`ErrorKind::Configuration`] aborts the whole invocation before anything runs.
//! - [`ErrorKind::Build`] fails a single task; its dependents are failed without running.
//! - [`ErrorKind::Internal`] aborts the run from inside the scheduler.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::cache::CacheError;
use crate::task::TargetId;

/// Classification used by the scheduler to decide how an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal misconfiguration, not attributable to one task
    Configuration,
    /// Recoverable failure scoped to one task
    Build,
    /// Anything else (a bug)
    Internal,
}

/// Fatal configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two tasks registered for one target
    #[error("Task '{new}' purports to create '{target}', but '{existing}' already creates that file")]
    DuplicateTarget {
        target: TargetId,
        existing: String,
        new: String,
    },

    /// Abstract target requested but never registered
    #[error("Target '{target}' (requested by {requested_by}) is abstract but doesn't have a task")]
    AbstractWithoutTask {
        target: TargetId,
        requested_by: String,
    },
}

/// Recoverable failures raised by a task action
#[derive(Debug, Error)]
pub enum BuildError {
    /// A plain-file dependency is missing and nothing builds it
    #[error("Target '{target}' (requested by {requested_by}) doesn't exist and doesn't have a task to make it")]
    MissingFile {
        target: TargetId,
        requested_by: String,
    },

    /// Command executable not found on PATH
    #[error("Couldn't find file for command '{0}'")]
    ExecutableNotFound(String),

    /// Command with no program
    #[error("Cannot run an empty command")]
    EmptyCommand,

    /// Process could not be launched
    #[error("{source} from:\n    {command}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Process exited unsuccessfully
    #[error("{status} from:\n    {command}")]
    CommandFailed { command: String, status: ExitStatus },

    /// Copy rule failed
    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    /// Rule-specific failure
    #[error("{0}")]
    Message(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Error returned by a task action
#[derive(Debug, Error)]
pub enum TaskError {
    /// Recoverable build failure
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Unexpected failure; aborts the run
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Create an internal error with a message
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(_) => ErrorKind::Build,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error returned by [`Engine::update`](crate::Engine::update)
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error found while resolving the graph
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unexpected failure inside a task or the scheduler
    #[error("{0}")]
    Internal(String),

    /// The cache file could not be written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Internal(_) | Self::Cache(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_kind() {
        let build: TaskError = BuildError::EmptyCommand.into();
        assert_eq!(build.kind(), ErrorKind::Build);
        assert_eq!(TaskError::internal("oops").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_engine_error_kind() {
        let err: EngineError = ConfigError::AbstractWithoutTask {
            target: TargetId::new(":all"),
            requested_by: "user".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "Target ':all' (requested by user) is abstract but doesn't have a task"
        );
    }

    #[test]
    fn test_missing_file_message() {
        let err = BuildError::MissingFile {
            target: TargetId::new("src/main.cpp"),
            requested_by: "'objs/main.o'".to_string(),
        };
        assert!(err.to_string().contains("doesn't exist"));
        assert!(err.to_string().contains("'objs/main.o'"));
    }
}
