//! Engine: owns the registry, options and both cache layers

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, instrument};

use crate::cache::{CacheStats, LoadStats, TaskCache, DEFAULT_CACHE_FILE};
use crate::dag::TaskDag;
use crate::error::{ConfigError, EngineError};
use crate::hash::{HashStats, HashStore};
use crate::registry::TaskRegistry;
use crate::reporter::TaskReporter;
use crate::runner::{ProcessRunner, RunnerStats};
use crate::scheduler::{default_jobs, RunSummary, SchedulerOptions, TaskScheduler};
use crate::task::{Task, TargetId};

/// Options for one engine instance
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum concurrently running tasks
    pub jobs: usize,
    /// Stop launching new tasks after the first failure
    pub quit_eagerly: bool,
    /// Persistent cache location
    pub cache_file: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            quit_eagerly: false,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}

/// Counters gathered across the engine's stores
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics {
    pub hashes: HashStats,
    pub runner: RunnerStats,
    pub cache: CacheStats,
    /// Result of the most recent cache load
    pub load: LoadStats,
}

/// An incremental build engine.
///
/// Rule layers register tasks, then [`Engine::update`] brings a set of
/// targets up to date. Each engine is independent of every other.
pub struct Engine {
    options: EngineOptions,
    registry: TaskRegistry,
    hashes: Arc<HashStore>,
    cache: Arc<TaskCache>,
    reporter: Arc<dyn TaskReporter>,
    runner: ProcessRunner,
    last_load: Mutex<LoadStats>,
}

impl Engine {
    /// Create an engine with an empty registry
    pub fn new(options: EngineOptions, reporter: Arc<dyn TaskReporter>) -> Self {
        let hashes = Arc::new(HashStore::new());
        let cache = Arc::new(TaskCache::new(options.cache_file.clone()));
        let runner = ProcessRunner::new(
            Arc::clone(&hashes),
            Arc::clone(&cache),
            Arc::clone(&reporter),
        );

        Self {
            options,
            registry: TaskRegistry::new(),
            hashes,
            cache,
            reporter,
            runner,
            last_load: Mutex::new(LoadStats::default()),
        }
    }

    /// Register a task; a duplicate target is a configuration error
    pub fn register(&mut self, task: Task) -> Result<TargetId, ConfigError> {
        self.registry.register(task)
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Shared handle to the command cache, e.g. for flushing on interrupt
    pub fn cache(&self) -> Arc<TaskCache> {
        Arc::clone(&self.cache)
    }

    /// Runner for hashing or running commands outside a task
    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Resolve the tasks needed for `targets` without running anything
    pub fn plan(&self, targets: &[TargetId]) -> Result<TaskDag, ConfigError> {
        TaskDag::resolve(&self.registry, targets)
    }

    /// Bring `targets` up to date.
    ///
    /// Loads the cache file first and saves it afterwards whatever the
    /// outcome. Build failures are reported in the summary; configuration
    /// and internal errors are returned.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn update(&self, targets: &[TargetId]) -> Result<RunSummary, EngineError> {
        let load = self.cache.load();
        *self
            .last_load
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = load;
        self.hashes.clear();

        let result = self.schedule(targets).await;

        match self.cache.save() {
            Ok(()) => {
                info!(path = %self.cache.path().display(), "saved cache");
                result
            }
            Err(e) => {
                error!(path = %self.cache.path().display(), error = %e, "failed to save cache");
                // A run error takes precedence over the save failure
                result.and(Err(e.into()))
            }
        }
    }

    async fn schedule(&self, targets: &[TargetId]) -> Result<RunSummary, EngineError> {
        let dag = self.plan(targets)?;
        let scheduler = TaskScheduler::new(
            SchedulerOptions {
                jobs: self.options.jobs,
                quit_eagerly: self.options.quit_eagerly,
            },
            Arc::clone(&self.reporter),
        );
        scheduler.execute(&dag, &self.runner).await
    }

    /// Current counters from the hash store, runner and cache
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            hashes: self.hashes.stats(),
            runner: self.runner.stats(),
            cache: self.cache.stats(),
            load: *self
                .last_load
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reporter::CollectingReporter;
    use crate::runner::Tracked;
    use crate::scheduler::TaskState;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine(dir: &Path, jobs: usize) -> (Engine, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let options = EngineOptions {
            jobs,
            quit_eagerly: false,
            cache_file: dir.join("kiln-cache.json"),
        };
        (Engine::new(options, reporter.clone()), reporter)
    }

    fn path(dir: &Path, name: &str) -> String {
        dir.join(name).to_string_lossy().into_owned()
    }

    /// Task running `sh -c <script>` with declared reads and writes
    fn shell(id: &str, deps: &[&str], script: &str, reads: &[&str], writes: &[&str]) -> Task {
        let label = format!("SH {id}");
        let command: Vec<String> = vec!["sh".into(), "-c".into(), script.into()];
        let tracked = Tracked::new(reads.to_vec(), writes.to_vec());

        Task::from_fn(id, label.clone(), move |runner| {
            let command = command.clone();
            let label = label.clone();
            let tracked = tracked.clone();
            async move {
                runner
                    .run(&command, &label, move || async move { Ok(tracked) })
                    .await
            }
        })
        .with_dependencies(deps.iter().copied())
    }

    /// Scenario tasks: `a` is produced from nothing, `b` copies `a`
    fn register_pair(engine: &mut Engine, dir: &Path, a_script: Option<&str>) {
        let a = path(dir, "out/a");
        let b = path(dir, "out/b");
        let default_a = format!("mkdir -p '{}' && echo a > '{}'", path(dir, "out"), a);
        let a_script = a_script.map(str::to_string).unwrap_or(default_a);

        engine
            .register(shell(&a, &[], &a_script, &[], &[a.as_str()]))
            .unwrap();
        engine
            .register(shell(
                &b,
                &[a.as_str()],
                &format!("cp '{}' '{}'", a, b),
                &[a.as_str()],
                &[b.as_str()],
            ))
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_builds_then_hits_cache() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let targets = vec![TargetId::new(path(dir, "out/b"))];

        let (mut first, _) = engine(dir, 4);
        register_pair(&mut first, dir, None);
        let summary = first.update(&targets).await.unwrap();
        assert!(summary.success());
        assert_eq!(summary.finished().count(), 2);
        assert_eq!(first.metrics().runner.spawned, 2);
        assert_eq!(std::fs::read_to_string(dir.join("out/b")).unwrap(), "a\n");

        let (mut second, _) = engine(dir, 4);
        register_pair(&mut second, dir, None);
        let summary = second.update(&targets).await.unwrap();
        assert!(summary.success());
        let metrics = second.metrics();
        assert_eq!(metrics.runner.spawned, 0);
        assert_eq!(metrics.runner.cache_hits, 2);
        assert_eq!(metrics.load.valid, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_dependency_skips_dependent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let targets = vec![TargetId::new(path(dir, "out/b"))];

        let (mut first, _) = engine(dir, 4);
        register_pair(&mut first, dir, None);
        assert!(first.update(&targets).await.unwrap().success());

        let (mut second, reporter) = engine(dir, 4);
        register_pair(&mut second, dir, Some("exit 1"));
        let summary = second.update(&targets).await.unwrap();

        assert!(!summary.success());
        assert_eq!(summary.state(&path(dir, "out/a")), Some(TaskState::Failed));
        assert_eq!(summary.state(&path(dir, "out/b")), Some(TaskState::Failed));
        assert_eq!(reporter.started(), vec![format!("SH {}", path(dir, "out/a"))]);
        // Cache is still written on failure
        assert!(dir.join("kiln-cache.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deleted_output_reexecutes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let targets = vec![TargetId::new(path(dir, "out/b"))];

        let (mut first, _) = engine(dir, 4);
        register_pair(&mut first, dir, None);
        assert!(first.update(&targets).await.unwrap().success());

        std::fs::remove_file(dir.join("out/b")).unwrap();

        let (mut second, _) = engine(dir, 4);
        register_pair(&mut second, dir, None);
        assert!(second.update(&targets).await.unwrap().success());
        assert_eq!(second.metrics().runner.spawned, 1);
        assert!(dir.join("out/b").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_changed_input_reexecutes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let src = path(dir, "src.txt");
        let out = path(dir, "out.txt");
        std::fs::write(&src, "one").unwrap();
        let targets = vec![TargetId::new(out.clone())];

        let register = |engine: &mut Engine| {
            engine
                .register(shell(
                    &out,
                    &[src.as_str()],
                    &format!("cp '{}' '{}'", src, out),
                    &[src.as_str()],
                    &[out.as_str()],
                ))
                .unwrap();
        };

        let (mut first, _) = engine(dir, 2);
        register(&mut first);
        assert!(first.update(&targets).await.unwrap().success());

        // Same length, different bytes
        std::fs::write(&src, "two").unwrap();

        let (mut second, _) = engine(dir, 2);
        register(&mut second);
        assert!(second.update(&targets).await.unwrap().success());
        assert_eq!(second.metrics().runner.spawned, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "two");
    }

    #[tokio::test]
    async fn test_unregistered_abstract_target_is_config_error() {
        let temp = TempDir::new().unwrap();
        let (engine, reporter) = engine(temp.path(), 2);

        let err = engine
            .update(&[TargetId::new(":missing")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(reporter.started().is_empty());
    }

    #[tokio::test]
    async fn test_missing_plain_file_fails_task() {
        let temp = TempDir::new().unwrap();
        let (mut engine, _) = engine(temp.path(), 2);
        let missing = path(temp.path(), "nothing.cpp");
        engine
            .register(
                Task::from_fn(":all", "ALL", |_runner| async { Ok(()) })
                    .with_dependency(missing.as_str()),
            )
            .unwrap();

        let summary = engine.update(&[TargetId::new(":all")]).await.unwrap();
        assert_eq!(summary.state(&missing), Some(TaskState::Failed));
        assert_eq!(summary.state(":all"), Some(TaskState::Failed));
    }

    #[tokio::test]
    async fn test_job_limit_one_runs_sequentially() {
        let temp = TempDir::new().unwrap();
        let (mut engine, _) = engine(temp.path(), 1);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for name in [":x", ":y", ":z"] {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let task = Task::from_fn(name, name, move |_runner| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            engine.register(task).unwrap();
        }

        let targets: Vec<TargetId> = [":x", ":y", ":z"].into_iter().map(TargetId::from).collect();
        let summary = engine.update(&targets).await.unwrap();

        assert!(summary.success());
        assert_eq!(summary.finished().count(), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let temp = TempDir::new().unwrap();
        let (mut engine, _) = engine(temp.path(), 1);

        engine
            .register(Task::from_fn("out/a", "FIRST", |_runner| async { Ok(()) }))
            .unwrap();
        let err = engine
            .register(Task::from_fn("out/a", "SECOND", |_runner| async { Ok(()) }))
            .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateTarget { .. }));
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_default_options() {
        let options = EngineOptions::default();
        assert!(options.jobs >= 2);
        assert!(!options.quit_eagerly);
        assert_eq!(options.cache_file, PathBuf::from("kiln-cache.json"));
    }
}
