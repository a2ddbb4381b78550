//! Build progress reporting

use std::sync::Mutex;
use std::time::Duration;

use crate::task::TargetId;

/// Events emitted while updating targets
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task's action is starting
    Started { id: TargetId, label: String },
    /// A command is about to be spawned (cache miss or uncached)
    CommandStarted { label: String, command: String },
    /// A command was skipped because its cache entry matched
    CacheHit { label: String },
    /// A cache entry existed but no longer matched
    CacheMiss { label: String },
    /// A task's action finished successfully
    Completed {
        id: TargetId,
        label: String,
        duration: Duration,
    },
    /// A task's action failed
    Failed {
        id: TargetId,
        label: String,
        duration: Duration,
        error: String,
    },
    /// A task was failed without running because dependencies failed
    Skipped {
        id: TargetId,
        label: String,
        failed_dependencies: Vec<TargetId>,
    },
    /// The scheduler has stopped
    AllCompleted {
        total: usize,
        finished: usize,
        failed: usize,
        never_run: usize,
        duration: Duration,
    },
}

/// Trait for reporting build progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Labels of the tasks whose action was started, in start order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Started { label, .. } => Some(label),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
