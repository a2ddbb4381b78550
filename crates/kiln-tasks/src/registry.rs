//! Task registry: one task per target

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::ConfigError;
use crate::task::{Task, TargetId};

/// Mapping from target to the task that produces it.
///
/// Filled by rule layers before any scheduling happens.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TargetId, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its target.
    ///
    /// A second registration for the same target is a configuration error.
    pub fn register(&mut self, task: Task) -> Result<TargetId, ConfigError> {
        if let Some(existing) = self.tasks.get(&task.id) {
            return Err(ConfigError::DuplicateTarget {
                target: task.id.clone(),
                existing: existing.label.clone(),
                new: task.label,
            });
        }

        debug!(task = %task.id, label = %task.label, "registered task");
        let id = task.id.clone();
        self.tasks.insert(id.clone(), Arc::new(task));
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str, label: &str) -> Task {
        Task::from_fn(id, label, |_runner| async { Ok(()) })
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = TaskRegistry::new();
        let id = registry.register(noop("objs/a.o", "CPP objs/a.o")).unwrap();

        assert_eq!(id, TargetId::new("objs/a.o"));
        assert_eq!(registry.get("objs/a.o").unwrap().label, "CPP objs/a.o");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register(noop("objs/a.o", "CPP objs/a.o")).unwrap();

        let err = registry
            .register(noop("objs/a.o", "COPY objs/a.o"))
            .unwrap_err();

        match err {
            ConfigError::DuplicateTarget {
                target,
                existing,
                new,
            } => {
                assert_eq!(target.as_str(), "objs/a.o");
                assert_eq!(existing, "CPP objs/a.o");
                assert_eq!(new, "COPY objs/a.o");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The first registration is kept
        assert_eq!(registry.get("objs/a.o").unwrap().label, "CPP objs/a.o");
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(":all").is_none());
    }
}
