//! Task event reporting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::output::TaskTag;
use crate::task::TaskState;

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// What an interactive selection will do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Restart,
    Kill,
}

impl std::fmt::Display for SelectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restart => write!(f, "restart"),
            Self::Kill => write!(f, "kill"),
        }
    }
}

/// One row of the interactive task list
#[derive(Debug, Clone)]
pub struct TaskListEntry {
    pub tag: Arc<TaskTag>,
    pub state: TaskState,
}

/// Events emitted while supervising tasks
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A process was spawned
    Started { tag: Arc<TaskTag>, pid: u32 },
    /// A task produced a line of output
    Output {
        tag: Arc<TaskTag>,
        line: String,
        stream: Stream,
    },
    /// A task exited with status 0
    Exited { tag: Arc<TaskTag> },
    /// A task exited unsuccessfully on its own
    Failed {
        tag: Arc<TaskTag>,
        code: Option<i32>,
    },
    /// A failed task is being respawned in watch mode
    AutoRestarting {
        tag: Arc<TaskTag>,
        attempt: u32,
        max: u32,
    },
    /// An operator asked for a restart
    Restarting { tag: Arc<TaskTag> },
    /// An operator stopped a task
    Killed { tag: Arc<TaskTag> },
    /// A kill request found nothing to stop
    AlreadyStopped { tag: Arc<TaskTag> },
    /// The OS refused to start a task
    SpawnFailed { tag: Arc<TaskTag>, error: String },
    /// Selection mode was entered
    TaskList {
        mode: SelectMode,
        entries: Vec<TaskListEntry>,
    },
    /// Typed letters matched no shortcut
    NoMatch { input: String },
    /// Selection mode was left without acting
    SelectCancelled,
}

impl TaskEvent {
    /// Whether the event may be dropped once shutdown silences output
    pub fn is_essential(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::SpawnFailed { .. })
    }
}

/// Trait for reporting task supervision progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Shared switch that silences non-essential output during shutdown
#[derive(Debug, Clone, Default)]
pub struct OutputGate {
    closed: Arc<AtomicBool>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Whether `event` should still be shown
    pub fn admits(&self, event: &TaskEvent) -> bool {
        self.is_open() || event.is_essential()
    }
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { tag, pid } => {
                tracing::info!(index = tag.index, pid, "started {}", tag.label);
            }
            TaskEvent::Output { tag, line, stream } => {
                tracing::trace!(index = tag.index, ?stream, "[{}] {}", tag.label, line);
            }
            TaskEvent::Exited { tag } => {
                tracing::info!(index = tag.index, "{} exited", tag.label);
            }
            TaskEvent::Failed { tag, code } => {
                tracing::warn!(index = tag.index, ?code, "{} failed", tag.label);
            }
            TaskEvent::AutoRestarting { tag, attempt, max } => {
                tracing::info!(index = tag.index, attempt, max, "restarting {}", tag.label);
            }
            TaskEvent::Restarting { tag } => {
                tracing::info!(index = tag.index, "restart requested for {}", tag.label);
            }
            TaskEvent::Killed { tag } => {
                tracing::info!(index = tag.index, "{} killed", tag.label);
            }
            TaskEvent::AlreadyStopped { tag } => {
                tracing::debug!(index = tag.index, "{} already stopped", tag.label);
            }
            TaskEvent::SpawnFailed { tag, error } => {
                tracing::error!(index = tag.index, "failed to start {}: {}", tag.label, error);
            }
            TaskEvent::TaskList { mode, entries } => {
                tracing::debug!(%mode, tasks = entries.len(), "selection started");
            }
            TaskEvent::NoMatch { input } => {
                tracing::debug!(%input, "no shortcut matched");
            }
            TaskEvent::SelectCancelled => {
                tracing::debug!("selection cancelled");
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
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

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    /// Broadcast an event to all registered reporters
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
