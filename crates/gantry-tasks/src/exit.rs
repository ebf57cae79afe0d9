//! Single-flight session shutdown
//!
//! Every way a session can end (Ctrl-C, SIGTERM, a task failure that ran out
//! of restarts, all tasks finishing) funnels into [`ExitCoordinator::shutdown`].
//! The first caller runs the termination sequence; everyone else awaits the
//! same [`ShutdownReport`].

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use gantry_core::SupervisorConfig;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::group::{GroupSignal, LiveGroups, ProcessGroupControl};
use crate::reporter::OutputGate;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Why the session is ending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Ctrl-C, from the terminal or SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// A task failed and was not restarted
    TaskFailed { label: String },
    /// Every task is done
    Finished(i32),
}

impl ExitReason {
    /// Process exit status for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupt | Self::Terminate => 0,
            Self::TaskFailed { .. } => 1,
            Self::Finished(code) => *code,
        }
    }
}

/// Outcome of the one shutdown that actually ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ExitReason,
    pub exit_code: i32,
    /// Labels of the process groups that were signalled
    pub stopped: Vec<String>,
}

/// How long groups get between SIGTERM and SIGKILL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitGrace {
    pub interrupt: Duration,
    pub terminate: Duration,
}

impl ExitGrace {
    fn for_reason(&self, reason: &ExitReason) -> Duration {
        match reason {
            ExitReason::Interrupt => self.interrupt,
            _ => self.terminate,
        }
    }
}

impl Default for ExitGrace {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for ExitGrace {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            interrupt: config.interrupt_grace(),
            terminate: config.terminate_grace(),
        }
    }
}

/// Work run once at the start of shutdown, before any group is signalled
pub type TeardownHook = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Owns the end of the session.
///
/// At most one coordinator may be installed per process.
pub struct ExitCoordinator {
    groups: LiveGroups,
    control: Arc<dyn ProcessGroupControl>,
    gate: OutputGate,
    grace: ExitGrace,
    teardown: Mutex<Option<TeardownHook>>,
    report: OnceCell<ShutdownReport>,
    guarded: bool,
}

impl ExitCoordinator {
    /// Install the process-wide coordinator
    pub fn install(
        groups: LiveGroups,
        control: Arc<dyn ProcessGroupControl>,
        gate: OutputGate,
        grace: ExitGrace,
    ) -> Result<Arc<Self>> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SupervisorError::CoordinatorInstalled);
        }

        let mut coordinator = Self::build(groups, control, gate, grace);
        coordinator.guarded = true;
        Ok(Arc::new(coordinator))
    }

    /// A coordinator that skips the install guard, so tests can run side by side
    #[cfg(test)]
    pub(crate) fn unguarded(
        groups: LiveGroups,
        control: Arc<dyn ProcessGroupControl>,
        gate: OutputGate,
        grace: ExitGrace,
    ) -> Arc<Self> {
        Arc::new(Self::build(groups, control, gate, grace))
    }

    fn build(
        groups: LiveGroups,
        control: Arc<dyn ProcessGroupControl>,
        gate: OutputGate,
        grace: ExitGrace,
    ) -> Self {
        Self {
            groups,
            control,
            gate,
            grace,
            teardown: Mutex::new(None),
            report: OnceCell::new(),
            guarded: false,
        }
    }

    /// Registry the supervisor records spawned groups in
    pub fn groups(&self) -> &LiveGroups {
        &self.groups
    }

    pub fn control(&self) -> Arc<dyn ProcessGroupControl> {
        self.control.clone()
    }

    /// Set the hook that restores terminal state. Replaces any earlier hook.
    pub fn set_teardown(&self, hook: TeardownHook) {
        *self.teardown.lock().unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.groups.is_closed() || self.report.initialized()
    }

    /// The report, if shutdown has completed
    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.get()
    }

    /// Run the termination sequence once; later and concurrent callers get
    /// the same report regardless of the reason they pass.
    pub async fn shutdown(&self, reason: ExitReason) -> ShutdownReport {
        self.report
            .get_or_init(|| self.terminate_all(reason))
            .await
            .clone()
    }

    /// Shut down, then end the process with the report's exit code.
    ///
    /// The future never resolves; callers write
    /// `match coordinator.exit(reason).await {}` to diverge.
    pub async fn exit(&self, reason: ExitReason) -> Infallible {
        let report = self.shutdown(reason).await;
        std::process::exit(report.exit_code)
    }

    async fn terminate_all(&self, reason: ExitReason) -> ShutdownReport {
        info!(?reason, "shutting down");

        if reason == ExitReason::Interrupt {
            self.gate.close();
        }

        let hook = self
            .teardown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                warn!(error = %e, "teardown failed");
            }
        }

        let groups = self.groups.close();
        for group in &groups {
            debug!(pgid = group.pgid, label = %group.label, "terminating group");
            if let Err(e) = self.control.signal(group.pgid, GroupSignal::Terminate) {
                warn!(pgid = group.pgid, error = %e, "failed to send SIGTERM");
            }
        }

        if !groups.is_empty() {
            tokio::time::sleep(self.grace.for_reason(&reason)).await;
        }

        for group in groups.iter().filter(|g| self.control.is_alive(g.pgid)) {
            debug!(pgid = group.pgid, label = %group.label, "killing group");
            if let Err(e) = self.control.signal(group.pgid, GroupSignal::Kill) {
                warn!(pgid = group.pgid, error = %e, "failed to send SIGKILL");
            }
        }

        ShutdownReport {
            exit_code: reason.exit_code(),
            reason,
            stopped: groups.into_iter().map(|g| g.label).collect(),
        }
    }
}

impl Drop for ExitCoordinator {
    fn drop(&mut self) {
        if self.guarded {
            INSTALLED.store(false, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for ExitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitCoordinator")
            .field("groups", &self.groups)
            .field("grace", &self.grace)
            .field("report", &self.report.get())
            .finish_non_exhaustive()
    }
}
