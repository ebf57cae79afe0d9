//! Building the command that runs one task

use std::collections::BTreeSet;
use std::path::PathBuf;

use gantry_core::monorepo::{PackageManager, RUNNING_TASKS_ENV};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SupervisorError};
use crate::task::TaskSpec;

/// Tells a nested runner to keep its own banner quiet
pub const SILENT_ENV: &str = "GANTRY_SILENT";

/// Turns a task into a ready-to-spawn command.
///
/// Implementations set the program, arguments, working directory and
/// environment. The supervisor adds process-group and stdio settings.
pub trait Launcher: Send + Sync {
    fn command(&self, spec: &TaskSpec) -> Command;
}

/// Runs manifest scripts through the package manager (`pnpm run dev`, ...)
#[derive(Debug, Clone)]
pub struct RunnerLauncher {
    runner: PackageManager,
    executable: PathBuf,
    running_tasks: String,
}

impl RunnerLauncher {
    /// Locate `runner` on `PATH`.
    ///
    /// `running` is the inherited marker set; `session` the task names this
    /// session launches. Children see their union, so a script that starts
    /// gantry again skips what is already up.
    pub fn locate<I, S>(runner: PackageManager, running: &BTreeSet<String>, session: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let executable =
            which::which(runner.executable()).map_err(|source| SupervisorError::RunnerNotFound {
                runner: runner.executable().to_string(),
                source,
            })?;
        debug!(runner = %runner, path = %executable.display(), "located runner");

        Ok(Self::with_executable(runner, executable, running, session))
    }

    /// Use an already known executable path
    pub fn with_executable<I, S>(
        runner: PackageManager,
        executable: PathBuf,
        running: &BTreeSet<String>,
        session: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = running.clone();
        names.extend(session.into_iter().map(Into::into));
        let running_tasks = names.into_iter().collect::<Vec<_>>().join(",");

        Self {
            runner,
            executable,
            running_tasks,
        }
    }

    /// Value of the running-tasks marker handed to children
    pub fn running_tasks(&self) -> &str {
        &self.running_tasks
    }
}

impl Launcher for RunnerLauncher {
    fn command(&self, spec: &TaskSpec) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.runner.run_args(&spec.name, &spec.extra_args))
            .current_dir(&spec.working_dir)
            .env(RUNNING_TASKS_ENV, &self.running_tasks)
            .env(SILENT_ENV, "1")
            .env("FORCE_COLOR", "1");
        cmd
    }
}
