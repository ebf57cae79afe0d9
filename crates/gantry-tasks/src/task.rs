//! Task types and definitions

use std::fmt;
use std::path::PathBuf;

use gantry_core::ResolvedTask;

/// What to launch for one registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Script name (e.g., "dev", "build")
    pub name: String,
    /// Directory the process runs in
    pub working_dir: PathBuf,
    /// Display label
    pub label: String,
    /// Workspace package, if not a root task
    pub package: Option<String>,
    /// Arguments forwarded to the script
    pub extra_args: Vec<String>,
}

impl TaskSpec {
    /// Create a root-level task spec labelled by its name
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            working_dir: working_dir.into(),
            package: None,
            extra_args: Vec::new(),
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set forwarded arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

impl From<ResolvedTask> for TaskSpec {
    fn from(task: ResolvedTask) -> Self {
        Self {
            name: task.name,
            working_dir: task.working_dir,
            label: task.label,
            package: task.package,
            extra_args: task.extra_args,
        }
    }
}

/// Lifecycle of one registry entry.
///
/// `Restarting` and `Killing` mark transitions the supervisor started itself,
/// so an exit observed in those states is never treated as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Process is running
    Running,
    /// Old process is being replaced
    Restarting,
    /// Process is being stopped on request
    Killing,
    /// Stopped on request; stays listed until restarted
    Stopped,
    /// Exited on its own
    Exited { code: Option<i32> },
    /// The OS refused to start the process
    FailedToStart,
}

impl TaskState {
    /// Whether a process is (or may still be) attached to this entry
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Restarting | Self::Killing)
    }

    /// Whether a kill request has nothing left to stop
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            Self::Killing | Self::Stopped | Self::Exited { .. } | Self::FailedToStart
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Restarting => write!(f, "restarting"),
            Self::Killing => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited { code: Some(code) } => write!(f, "exited ({})", code),
            Self::Exited { code: None } => write!(f, "exited (signal)"),
            Self::FailedToStart => write!(f, "failed to start"),
        }
    }
}
