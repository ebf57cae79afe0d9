//! Gantry Tasks - Process supervision engine
//!
//! This crate spawns tasks as process groups, multiplexes their output,
//! hands out keyboard shortcuts, interprets the interactive control keys
//! and coordinates a single graceful-then-forceful shutdown.

pub mod control;
pub mod error;
pub mod exit;
pub mod group;
pub mod launcher;
pub mod output;
pub mod reporter;
pub mod shortcut;
pub mod supervisor;
pub mod task;

pub use control::{ControlEffect, ControlSurface};
pub use error::{Result, SupervisorError};
pub use exit::{ExitCoordinator, ExitGrace, ExitReason, ShutdownReport, TeardownHook};
pub use group::{LiveGroups, ProcessGroupControl, SystemGroups};
pub use launcher::{Launcher, RunnerLauncher};
pub use output::TaskTag;
pub use reporter::{
    CollectingReporter, OutputGate, SelectMode, Stream, TaskEvent, TaskListEntry, TaskReporter,
    TaskReporterRegistry, TracingReporter,
};
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorOptions};
pub use task::{TaskSpec, TaskState};
