//! Task scheduler: bounded-concurrency executor using tokio

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::dag::TaskDag;
use crate::error::{EngineError, ErrorKind, TaskError};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::runner::ProcessRunner;
use crate::task::TargetId;

/// Scheduling state of one task during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting on dependencies
    Pending,
    /// All dependencies terminal; queued for launch
    Ready,
    /// Action in flight
    Running,
    /// Action succeeded
    Finished,
    /// Action failed, or a dependency failed
    Failed,
}

impl TaskState {
    /// Whether the task has reached `Finished` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrently running tasks
    pub jobs: usize,
    /// Stop launching new tasks after the first failure
    pub quit_eagerly: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            quit_eagerly: false,
        }
    }
}

/// Available parallelism plus one, so a process is ready while another exits
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

/// Final state of one task
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TargetId,
    pub label: String,
    pub state: TaskState,
}

/// Outcome of a scheduler run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Every resolved task, in resolution order
    pub tasks: Vec<TaskRecord>,
    /// Whether quit-eagerly mode stopped new launches
    pub cancelled: bool,
    /// Wall time of the run
    pub duration: Duration,
}

impl RunSummary {
    /// True when every resolved task finished
    pub fn success(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Finished)
    }

    /// Final state of a target, if it was part of the run
    pub fn state(&self, id: &str) -> Option<TaskState> {
        self.tasks
            .iter()
            .find(|t| t.id.as_str() == id)
            .map(|t| t.state)
    }

    pub fn finished(&self) -> impl Iterator<Item = &TaskRecord> {
        self.with_state(|s| s == TaskState::Finished)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.with_state(|s| s == TaskState::Failed)
    }

    /// Tasks that never reached a terminal state
    pub fn skipped(&self) -> impl Iterator<Item = &TaskRecord> {
        self.with_state(|s| !s.is_terminal())
    }

    /// Tasks were left unattempted without a cancellation: a dependency cycle
    pub fn has_cycle(&self) -> bool {
        !self.cancelled && self.skipped().next().is_some()
    }

    fn with_state(&self, pred: impl Fn(TaskState) -> bool) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(move |t| pred(t.state))
    }
}

type Completion = (TargetId, Duration, Result<(), TaskError>);

/// Task scheduler: executes a resolved graph with at most `jobs` tasks running
pub struct TaskScheduler {
    options: SchedulerOptions,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(options: SchedulerOptions, reporter: Arc<dyn TaskReporter>) -> Self {
        Self { options, reporter }
    }

    /// Execute every task in the graph.
    ///
    /// Build failures are recorded on the task and propagate to dependents.
    /// An internal error or a panicking action aborts the run.
    #[instrument(skip_all, fields(tasks = dag.len(), jobs = self.options.jobs))]
    pub async fn execute(
        &self,
        dag: &TaskDag,
        runner: &ProcessRunner,
    ) -> Result<RunSummary, EngineError> {
        let start = Instant::now();
        let jobs = self.options.jobs.max(1);

        let mut states: HashMap<TargetId, TaskState> = dag
            .order()
            .iter()
            .map(|id| (id.clone(), TaskState::Pending))
            .collect();
        let mut ready: VecDeque<TargetId> = VecDeque::new();
        for id in dag.roots() {
            states.insert(id.clone(), TaskState::Ready);
            ready.push_back(id.clone());
        }

        let mut running: JoinSet<Completion> = JoinSet::new();
        let mut cancelled = false;

        loop {
            while running.len() < jobs && !cancelled {
                let Some(id) = ready.pop_front() else { break };
                let Some(node) = dag.get(&id) else { continue };

                let failed_dependencies: Vec<TargetId> = node
                    .task
                    .dependencies
                    .iter()
                    .filter(|d| states.get(*d) == Some(&TaskState::Failed))
                    .cloned()
                    .collect();

                if !failed_dependencies.is_empty() {
                    states.insert(id.clone(), TaskState::Failed);
                    self.reporter.report(&TaskEvent::Skipped {
                        id: id.clone(),
                        label: node.task.label.clone(),
                        failed_dependencies,
                    });
                    release_dependents(dag, &id, &mut states, &mut ready);
                    continue;
                }

                states.insert(id.clone(), TaskState::Running);
                self.reporter.report(&TaskEvent::Started {
                    id: id.clone(),
                    label: node.task.label.clone(),
                });

                let action = node.task.action();
                let runner = runner.clone();
                running.spawn(async move {
                    let began = Instant::now();
                    let result = action.run(runner).await;
                    (id, began.elapsed(), result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (id, duration, result) =
                joined.map_err(|e| EngineError::Internal(format!("task panicked: {}", e)))?;
            let label = dag
                .get(&id)
                .map(|n| n.task.label.clone())
                .unwrap_or_default();

            match result {
                Ok(()) => {
                    states.insert(id.clone(), TaskState::Finished);
                    self.reporter.report(&TaskEvent::Completed {
                        id: id.clone(),
                        label,
                        duration,
                    });
                }
                Err(e) if e.kind() == ErrorKind::Build => {
                    states.insert(id.clone(), TaskState::Failed);
                    self.reporter.report(&TaskEvent::Failed {
                        id: id.clone(),
                        label,
                        duration,
                        error: e.to_string(),
                    });
                    if self.options.quit_eagerly && !cancelled {
                        warn!(task = %id, "quitting eagerly after failure");
                        cancelled = true;
                    }
                }
                Err(e) => {
                    running.abort_all();
                    return Err(EngineError::Internal(e.to_string()));
                }
            }

            release_dependents(dag, &id, &mut states, &mut ready);
        }

        let tasks: Vec<TaskRecord> = dag
            .order()
            .iter()
            .filter_map(|id| {
                let node = dag.get(id)?;
                Some(TaskRecord {
                    id: id.clone(),
                    label: node.task.label.clone(),
                    state: states.get(id).copied().unwrap_or(TaskState::Pending),
                })
            })
            .collect();

        let summary = RunSummary {
            tasks,
            cancelled,
            duration: start.elapsed(),
        };

        self.reporter.report(&TaskEvent::AllCompleted {
            total: summary.tasks.len(),
            finished: summary.finished().count(),
            failed: summary.failed().count(),
            never_run: summary.skipped().count(),
            duration: summary.duration,
        });
        info!(success = summary.success(), cancelled, "scheduler finished");

        Ok(summary)
    }
}

/// Queue every pending dependent whose dependencies are now all terminal
fn release_dependents(
    dag: &TaskDag,
    id: &TargetId,
    states: &mut HashMap<TargetId, TaskState>,
    ready: &mut VecDeque<TargetId>,
) {
    let Some(node) = dag.get(id) else { return };

    for dependent in &node.dependents {
        if states.get(dependent) != Some(&TaskState::Pending) {
            continue;
        }
        let Some(dep_node) = dag.get(dependent) else { continue };
        let unblocked = dep_node
            .task
            .dependencies
            .iter()
            .all(|d| states.get(d).is_some_and(|s| s.is_terminal()));
        if unblocked {
            debug!(task = %dependent, "ready");
            states.insert(dependent.clone(), TaskState::Ready);
            ready.push_back(dependent.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TaskCache;
    use crate::error::BuildError;
    use crate::hash::HashStore;
    use crate::registry::TaskRegistry;
    use crate::reporter::CollectingReporter;
    use crate::task::Task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runner() -> ProcessRunner {
        ProcessRunner::new(
            Arc::new(HashStore::new()),
            Arc::new(TaskCache::new("unused-cache.json")),
            Arc::new(CollectingReporter::default()),
        )
    }

    fn ok(id: &str, deps: &[&str]) -> Task {
        Task::from_fn(id, format!("OK {id}"), |_runner| async { Ok(()) })
            .with_dependencies(deps.iter().copied())
    }

    fn fail(id: &str, deps: &[&str]) -> Task {
        Task::from_fn(id, format!("FAIL {id}"), |_runner| async {
            Err(BuildError::Message("boom".to_string()).into())
        })
        .with_dependencies(deps.iter().copied())
    }

    async fn run(
        tasks: Vec<Task>,
        targets: &[&str],
        options: SchedulerOptions,
    ) -> (Result<RunSummary, EngineError>, Arc<CollectingReporter>) {
        let mut registry = TaskRegistry::new();
        for task in tasks {
            registry.register(task).unwrap();
        }
        let targets: Vec<TargetId> = targets.iter().map(|t| TargetId::new(*t)).collect();
        let dag = TaskDag::resolve(&registry, &targets).unwrap();

        let reporter = Arc::new(CollectingReporter::default());
        let scheduler = TaskScheduler::new(options, reporter.clone());
        let result = scheduler.execute(&dag, &runner()).await;
        (result, reporter)
    }

    fn options(jobs: usize, quit_eagerly: bool) -> SchedulerOptions {
        SchedulerOptions { jobs, quit_eagerly }
    }

    #[tokio::test]
    async fn test_dependencies_run_first() {
        let (result, reporter) = run(
            vec![ok(":all", &[":b"]), ok(":b", &[":a"]), ok(":a", &[])],
            &[":all"],
            options(4, false),
        )
        .await;

        let summary = result.unwrap();
        assert!(summary.success());
        assert_eq!(reporter.started(), vec!["OK :a", "OK :b", "OK :all"]);
    }

    #[tokio::test]
    async fn test_failure_propagates_without_running_dependent() {
        let (result, reporter) = run(
            vec![ok(":b", &[":a"]), fail(":a", &[]), ok(":c", &[])],
            &[":b", ":c"],
            options(2, false),
        )
        .await;

        let summary = result.unwrap();
        assert!(!summary.success());
        assert_eq!(summary.state(":a"), Some(TaskState::Failed));
        assert_eq!(summary.state(":b"), Some(TaskState::Failed));
        assert_eq!(summary.state(":c"), Some(TaskState::Finished));
        assert!(!reporter.started().contains(&"OK :b".to_string()));
        assert!(!summary.has_cycle());
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            TaskEvent::Skipped { id, failed_dependencies, .. }
                if id.as_str() == ":b" && failed_dependencies == &[TargetId::new(":a")]
        )));
    }

    #[tokio::test]
    async fn test_failure_propagates_transitively() {
        let (result, _reporter) = run(
            vec![ok(":c", &[":b"]), ok(":b", &[":a"]), fail(":a", &[])],
            &[":c"],
            options(1, false),
        )
        .await;

        let summary = result.unwrap();
        assert_eq!(summary.failed().count(), 3);
        assert_eq!(summary.skipped().count(), 0);
    }

    #[tokio::test]
    async fn test_quit_eagerly_stops_new_launches() {
        let (result, reporter) = run(
            vec![fail(":a", &[]), ok(":b", &[]), ok(":c", &[])],
            &[":a", ":b", ":c"],
            options(1, true),
        )
        .await;

        let summary = result.unwrap();
        assert!(summary.cancelled);
        assert!(!summary.has_cycle());
        assert_eq!(reporter.started(), vec!["FAIL :a"]);
        assert_eq!(summary.skipped().count(), 2);
    }

    #[tokio::test]
    async fn test_keep_going_without_quit_eagerly() {
        let (result, reporter) = run(
            vec![fail(":a", &[]), ok(":b", &[]), ok(":c", &[])],
            &[":a", ":b", ":c"],
            options(1, false),
        )
        .await;

        let summary = result.unwrap();
        assert!(!summary.cancelled);
        assert_eq!(reporter.started().len(), 3);
        assert_eq!(summary.finished().count(), 2);
    }

    #[tokio::test]
    async fn test_cycle_left_unattempted() {
        let (result, reporter) = run(
            vec![ok(":all", &[":a"]), ok(":a", &[":b"]), ok(":b", &[":a"])],
            &[":all"],
            options(2, false),
        )
        .await;

        let summary = result.unwrap();
        assert!(!summary.success());
        assert!(summary.has_cycle());
        assert_eq!(summary.skipped().count(), 3);
        assert!(reporter.started().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task> = (0..6)
            .map(|i| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                Task::from_fn(format!(":t{i}"), format!("T{i}"), move |_runner| {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        let (result, _reporter) = run(
            tasks,
            &[":t0", ":t1", ":t2", ":t3", ":t4", ":t5"],
            options(2, false),
        )
        .await;

        assert!(result.unwrap().success());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_internal_error_aborts() {
        let broken = Task::from_fn(":broken", "BROKEN", |_runner| async {
            Err(TaskError::internal("invariant violated"))
        });
        let (result, _reporter) = run(vec![broken], &[":broken"], options(1, false)).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("invariant violated"));
    }

    #[tokio::test]
    async fn test_all_completed_reported() {
        let (_result, reporter) = run(vec![ok(":a", &[])], &[":a"], options(1, false)).await;

        assert!(matches!(
            reporter.events().last(),
            Some(TaskEvent::AllCompleted {
                total: 1,
                finished: 1,
                failed: 0,
                never_run: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_default_jobs_at_least_two() {
        assert!(default_jobs() >= 2);
    }
}
