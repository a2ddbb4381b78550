//! Task graph resolution

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{BuildError, ConfigError, TaskError};
use crate::hash::is_readable;
use crate::registry::TaskRegistry;
use crate::runner::ProcessRunner;
use crate::task::{Task, TaskAction, TargetId};

/// A task in a resolved graph, with its back-edges
#[derive(Debug, Clone)]
pub struct TaskNode {
    /// The task
    pub task: Arc<Task>,
    /// Tasks waiting on this one
    pub dependents: Vec<TargetId>,
}

/// The transitive set of tasks needed for a set of requested targets.
///
/// Cycles are not rejected here: a task on a cycle can never become ready,
/// and the scheduler reports it as never run.
#[derive(Debug, Clone, Default)]
pub struct TaskDag {
    nodes: HashMap<TargetId, TaskNode>,
    order: Vec<TargetId>,
}

impl TaskDag {
    /// Resolve every task needed to build `targets`.
    ///
    /// A plain-file dependency with no registered task gets a synthesized
    /// task that only checks the file is readable. An abstract target with
    /// no registered task is a configuration error.
    #[instrument(skip_all, fields(requested = targets.len()))]
    pub fn resolve(registry: &TaskRegistry, targets: &[TargetId]) -> Result<Self, ConfigError> {
        let mut dag = Self::default();

        for target in targets {
            dag.need(registry, target, "user")?;
        }
        dag.link_dependents();

        info!(task_count = dag.len(), "task graph resolved");
        Ok(dag)
    }

    fn need(
        &mut self,
        registry: &TaskRegistry,
        target: &TargetId,
        requested_by: &str,
    ) -> Result<(), ConfigError> {
        let mut stack = vec![(target.clone(), requested_by.to_string())];

        while let Some((id, from)) = stack.pop() {
            if self.nodes.contains_key(&id) {
                continue;
            }

            let task = match registry.get(id.as_str()) {
                Some(task) => Arc::clone(task),
                None if id.is_abstract() => {
                    return Err(ConfigError::AbstractWithoutTask {
                        target: id,
                        requested_by: from,
                    });
                }
                None => {
                    debug!(task = %id, "synthesizing existence check");
                    Arc::new(exists_task(&id, &from))
                }
            };

            for dep in task.dependencies.iter().rev() {
                stack.push((dep.clone(), format!("'{}'", id)));
            }

            self.order.push(id.clone());
            self.nodes.insert(
                id,
                TaskNode {
                    task,
                    dependents: Vec::new(),
                },
            );
        }

        Ok(())
    }

    fn link_dependents(&mut self) {
        for id in &self.order {
            let deps = match self.nodes.get(id) {
                Some(node) => node.task.dependencies.clone(),
                None => continue,
            };
            for dep in deps {
                if let Some(dep_node) = self.nodes.get_mut(&dep) {
                    if !dep_node.dependents.contains(id) {
                        dep_node.dependents.push(id.clone());
                    }
                }
            }
        }
    }

    /// Get a specific task node
    pub fn get(&self, id: &TargetId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// Targets in the order they were first needed
    pub fn order(&self) -> &[TargetId] {
        &self.order
    }

    /// Targets with no dependencies (ready as soon as scheduling starts)
    pub fn roots(&self) -> impl Iterator<Item = &TargetId> {
        self.order.iter().filter(|id| {
            self.nodes
                .get(*id)
                .is_some_and(|n| n.task.dependencies.is_empty())
        })
    }

    /// Get the total number of tasks
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a human-readable summary of the resolved tasks
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        for id in &self.order {
            if let Some(node) = self.nodes.get(id) {
                let deps: Vec<&str> = node.task.dependencies.iter().map(|d| d.as_str()).collect();
                if deps.is_empty() {
                    plan.push_str(&format!("  {} -> {}\n", id, node.task.label));
                } else {
                    plan.push_str(&format!(
                        "  {} -> {} (after: {})\n",
                        id,
                        node.task.label,
                        deps.join(", ")
                    ));
                }
            }
        }
        plan
    }
}

/// Checks that a plain file with no task exists
struct ExistsCheck {
    target: TargetId,
    requested_by: String,
}

#[async_trait]
impl TaskAction for ExistsCheck {
    async fn run(&self, _runner: ProcessRunner) -> Result<(), TaskError> {
        if is_readable(self.target.as_str()).await {
            Ok(())
        } else {
            Err(BuildError::MissingFile {
                target: self.target.clone(),
                requested_by: self.requested_by.clone(),
            }
            .into())
        }
    }
}

fn exists_task(target: &TargetId, requested_by: &str) -> Task {
    Task::new(
        target.clone(),
        format!("EXISTS '{}'", target),
        ExistsCheck {
            target: target.clone(),
            requested_by: requested_by.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str, deps: &[&str]) -> Task {
        Task::from_fn(id, format!("TASK {id}"), |_runner| async { Ok(()) })
            .with_dependencies(deps.iter().copied())
    }

    fn registry(tasks: Vec<Task>) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for task in tasks {
            registry.register(task).unwrap();
        }
        registry
    }

    fn ids(names: &[&str]) -> Vec<TargetId> {
        names.iter().map(|n| TargetId::new(*n)).collect()
    }

    #[test]
    fn test_resolve_transitive() {
        let registry = registry(vec![
            noop("bin/main", &["objs/a.o", "objs/b.o"]),
            noop("objs/a.o", &["a.cpp"]),
            noop("objs/b.o", &["b.cpp"]),
            noop("objs/unused.o", &[]),
        ]);

        let dag = TaskDag::resolve(&registry, &ids(&["bin/main"])).unwrap();

        // 3 registered + 2 synthesized existence checks
        assert_eq!(dag.len(), 5);
        assert!(dag.get(&TargetId::new("objs/unused.o")).is_none());
        assert_eq!(dag.order()[0], TargetId::new("bin/main"));
    }

    #[test]
    fn test_synthesized_exists_task() {
        let registry = registry(vec![noop("objs/a.o", &["a.cpp"])]);
        let dag = TaskDag::resolve(&registry, &ids(&["objs/a.o"])).unwrap();

        let leaf = dag.get(&TargetId::new("a.cpp")).unwrap();
        assert_eq!(leaf.task.label, "EXISTS 'a.cpp'");
        assert!(leaf.task.dependencies.is_empty());
        assert_eq!(leaf.dependents, ids(&["objs/a.o"]));
    }

    #[test]
    fn test_abstract_without_task() {
        let registry = registry(vec![noop(":all", &[":missing"])]);
        let err = TaskDag::resolve(&registry, &ids(&[":all"])).unwrap_err();

        match err {
            ConfigError::AbstractWithoutTask {
                target,
                requested_by,
            } => {
                assert_eq!(target.as_str(), ":missing");
                assert_eq!(requested_by, "':all'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requested_abstract_without_task() {
        let registry = TaskRegistry::new();
        let err = TaskDag::resolve(&registry, &ids(&[":missing"])).unwrap_err();
        assert!(err.to_string().contains("requested by user"));
    }

    #[test]
    fn test_dependents_are_back_edges() {
        let registry = registry(vec![
            noop("bin/main", &["objs/a.o", "objs/b.o"]),
            noop("bin/tool", &["objs/a.o"]),
            noop("objs/a.o", &[]),
            noop("objs/b.o", &[]),
        ]);

        let dag = TaskDag::resolve(&registry, &ids(&["bin/main", "bin/tool"])).unwrap();

        let a = dag.get(&TargetId::new("objs/a.o")).unwrap();
        assert_eq!(a.dependents, ids(&["bin/main", "bin/tool"]));
        let b = dag.get(&TargetId::new("objs/b.o")).unwrap();
        assert_eq!(b.dependents, ids(&["bin/main"]));
    }

    #[test]
    fn test_duplicate_dependency_single_back_edge() {
        let registry = registry(vec![
            noop("bin/main", &["objs/a.o", "objs/a.o"]),
            noop("objs/a.o", &[]),
        ]);

        let dag = TaskDag::resolve(&registry, &ids(&["bin/main"])).unwrap();
        let a = dag.get(&TargetId::new("objs/a.o")).unwrap();
        assert_eq!(a.dependents, ids(&["bin/main"]));
    }

    #[test]
    fn test_cycle_is_resolved_not_rejected() {
        let registry = registry(vec![noop(":a", &[":b"]), noop(":b", &[":a"])]);

        let dag = TaskDag::resolve(&registry, &ids(&[":a"])).unwrap();
        assert_eq!(dag.len(), 2);
        assert_eq!(dag.roots().count(), 0);
    }

    #[test]
    fn test_roots() {
        let registry = registry(vec![noop(":all", &["objs/a.o"]), noop("objs/a.o", &[])]);
        let dag = TaskDag::resolve(&registry, &ids(&[":all"])).unwrap();

        let roots: Vec<&TargetId> = dag.roots().collect();
        assert_eq!(roots, vec![&TargetId::new("objs/a.o")]);
    }

    #[test]
    fn test_execution_plan_output() {
        let registry = registry(vec![noop("bin/main", &["objs/a.o"]), noop("objs/a.o", &[])]);
        let dag = TaskDag::resolve(&registry, &ids(&["bin/main"])).unwrap();
        let plan = dag.execution_plan();

        assert!(plan.contains("bin/main -> TASK bin/main (after: objs/a.o)"));
        assert!(plan.contains("objs/a.o -> TASK objs/a.o"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exists_check_action() {
        use crate::cache::TaskCache;
        use crate::hash::HashStore;
        use crate::reporter::CollectingReporter;

        let temp = tempfile::TempDir::new().unwrap();
        let present = temp.path().join("present.txt");
        std::fs::write(&present, "").unwrap();
        let runner = ProcessRunner::new(
            Arc::new(HashStore::new()),
            Arc::new(TaskCache::new(temp.path().join("cache.json"))),
            Arc::new(CollectingReporter::default()),
        );

        let ok = exists_task(&TargetId::new(present.to_string_lossy()), "user");
        assert!(ok.action().run(runner.clone()).await.is_ok());

        let missing = temp.path().join("absent.txt");
        let bad = exists_task(&TargetId::new(missing.to_string_lossy()), "'bin/main'");
        let err = bad.action().run(runner).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Build(BuildError::MissingFile { .. })
        ));
    }
}
