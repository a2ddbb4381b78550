//! Kiln Tasks - incremental build engine
//!
//! This crate provides the task registry, dependency graph resolution,
//! bounded-concurrency scheduling and content-hash caching of external
//! commands. Rule layers register [`Task`]s on an [`Engine`] and call
//! [`ProcessRunner::run`] from inside task actions.

pub mod cache;
pub mod dag;
pub mod engine;
pub mod error;
pub mod hash;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod task;

pub use cache::{CacheEntry, CacheError, LoadStats, TaskCache, DEFAULT_CACHE_FILE};
pub use dag::{TaskDag, TaskNode};
pub use engine::{Engine, EngineMetrics, EngineOptions};
pub use error::{BuildError, ConfigError, EngineError, ErrorKind, TaskError};
pub use hash::{HashStats, HashStore, MISSING_HASH};
pub use registry::TaskRegistry;
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter};
pub use runner::{pretty_command, ProcessRunner, RunnerStats, Tracked};
pub use scheduler::{RunSummary, SchedulerOptions, TaskRecord, TaskScheduler, TaskState};
pub use task::{Task, TaskAction, TargetId};
