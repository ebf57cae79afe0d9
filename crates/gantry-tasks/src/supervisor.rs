//! Process supervisor
//!
//! One tokio task owns the task registry and reacts to [`SupervisorEvent`]s:
//! process exits reported by per-child waiter tasks and commands sent through
//! a [`SupervisorHandle`]. Output pumps write straight to the reporter and
//! never touch the registry.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use gantry_core::SupervisorConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::exit::{ExitCoordinator, ExitReason};
use crate::group::{terminate_group, GroupSignal, LiveGroup, LiveGroups, ProcessGroupControl};
use crate::launcher::Launcher;
use crate::output::{pump, TaskTag, PALETTE};
use crate::reporter::{SelectMode, Stream, TaskEvent, TaskListEntry, TaskReporter};
use crate::shortcut;
use crate::task::{TaskSpec, TaskState};

/// Options for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Respawn failed tasks in place
    pub watch: bool,
    /// Respawns allowed per task in watch mode
    pub max_restarts: u32,
    /// SIGTERM to SIGKILL delay for restart and kill
    pub restart_grace: Duration,
    /// Name or label of the task that receives keyboard input
    pub stdin_target: Option<String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            watch: config.watch,
            max_restarts: config.max_restarts,
            restart_grace: config.restart_grace(),
            stdin_target: None,
        }
    }
}

/// Messages consumed by the supervisor loop
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A process exited. `generation` identifies which spawn it was.
    Exited {
        index: usize,
        generation: u64,
        code: Option<i32>,
    },
    /// The old process of a restarting task is gone; start the new one
    Respawn { index: usize, generation: u64 },
    Restart(usize),
    Kill(usize),
    Input(Vec<u8>),
    ShowTasks(SelectMode),
}

/// Cloneable sender for commands to a running supervisor
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl SupervisorHandle {
    fn send(&self, event: SupervisorEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| SupervisorError::Closed)
    }

    /// Replace the task's process with a fresh one
    pub fn restart(&self, index: usize) -> Result<()> {
        self.send(SupervisorEvent::Restart(index))
    }

    /// Stop the task; it stays listed and can be restarted
    pub fn kill(&self, index: usize) -> Result<()> {
        self.send(SupervisorEvent::Kill(index))
    }

    /// Write raw bytes to the stdin target
    pub fn send_input(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(SupervisorEvent::Input(bytes))
    }

    /// Report the task list for a selection
    pub fn show_tasks(&self, mode: SelectMode) -> Result<()> {
        self.send(SupervisorEvent::ShowTasks(mode))
    }
}

/// One registry entry
#[derive(Debug)]
struct ManagedTask {
    spec: TaskSpec,
    tag: Arc<TaskTag>,
    state: TaskState,
    restarts: u32,
    generation: u64,
    pgid: Option<u32>,
    /// Feeds the writer task that owns the child's stdin pipe
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Owns spawning, output multiplexing and the restart/kill mechanics
pub struct Supervisor {
    options: SupervisorOptions,
    launcher: Arc<dyn Launcher>,
    control: Arc<dyn ProcessGroupControl>,
    groups: LiveGroups,
    coordinator: Arc<ExitCoordinator>,
    reporter: Arc<dyn TaskReporter>,
    tasks: Vec<ManagedTask>,
    stdin_target: Option<usize>,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
    rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        options: SupervisorOptions,
        launcher: Arc<dyn Launcher>,
        coordinator: Arc<ExitCoordinator>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            options,
            launcher,
            control: coordinator.control(),
            groups: coordinator.groups().clone(),
            coordinator,
            reporter,
            tasks: Vec::new(),
            stdin_target: None,
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Shortcut per registry index
    pub fn shortcuts(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.tag.shortcut.clone()).collect()
    }

    pub fn stdin_target(&self) -> Option<usize> {
        self.stdin_target
    }

    /// Register every task, allocate shortcuts, then spawn them in order
    pub fn start(&mut self, specs: Vec<TaskSpec>) {
        let labels: Vec<&str> = specs.iter().map(|s| s.label.as_str()).collect();
        let shortcuts = shortcut::allocate(&labels);

        for (spec, shortcut) in specs.into_iter().zip(shortcuts) {
            let index = self.tasks.len();
            let tag = TaskTag {
                index,
                shortcut,
                label: spec.label.clone(),
                color: index % PALETTE.len(),
            };
            self.tasks.push(ManagedTask {
                spec,
                tag: Arc::new(tag),
                state: TaskState::FailedToStart,
                restarts: 0,
                generation: 0,
                pgid: None,
                stdin: None,
            });
        }

        self.stdin_target = self.pick_stdin_target();

        for index in 0..self.tasks.len() {
            self.spawn(index);
        }
    }

    fn pick_stdin_target(&self) -> Option<usize> {
        let Some(name) = &self.options.stdin_target else {
            return self.tasks.len().checked_sub(1);
        };
        let found = self
            .tasks
            .iter()
            .position(|t| t.spec.name == *name || t.spec.label == *name);
        if found.is_none() {
            warn!(stdin = %name, "no task matches the stdin target, using the last task");
        }
        found.or_else(|| self.tasks.len().checked_sub(1))
    }

    fn spawn(&mut self, index: usize) {
        let task = &mut self.tasks[index];
        let mut cmd = self.launcher.command(&task.spec);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let spawned = cmd
            .spawn()
            .and_then(|child| process_group_id(&child).map(|pid| (child, pid)));
        let (mut child, pid) = match spawned {
            Ok(spawned) => spawned,
            Err(source) => {
                let err = SupervisorError::Spawn {
                    label: task.spec.label.clone(),
                    source,
                };
                warn!(index, error = %err, "spawn failed");
                task.state = TaskState::FailedToStart;
                task.pgid = None;
                task.stdin = None;
                self.reporter.report(&TaskEvent::SpawnFailed {
                    tag: task.tag.clone(),
                    error: err.to_string(),
                });
                return;
            }
        };

        task.generation += 1;
        task.state = TaskState::Running;
        task.pgid = Some(pid);
        task.stdin = child.stdin.take().map(|pipe| stdin_writer(index, pipe));
        debug!(index, pid, generation = task.generation, "spawned task");

        let registered = self.groups.register(
            index,
            LiveGroup {
                pgid: pid,
                label: task.spec.label.clone(),
            },
        );
        if !registered {
            // shutdown began while this task was starting
            info!(index, pid, "shutdown in progress, killing late process group");
            if let Err(e) = self.control.signal(pid, GroupSignal::Kill) {
                warn!(pid, error = %e, "failed to kill late process group");
            }
        }

        self.reporter.report(&TaskEvent::Started {
            tag: task.tag.clone(),
            pid,
        });

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, Stream::Stdout, task.tag.clone(), self.reporter.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, Stream::Stderr, task.tag.clone(), self.reporter.clone()));
        }

        let tx = self.tx.clone();
        let generation = task.generation;
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(index, error = %e, "failed to wait for task");
                    None
                }
            };
            let _ = tx.send(SupervisorEvent::Exited {
                index,
                generation,
                code,
            });
        });
    }

    /// Drive the session until it ends; returns the process exit code
    pub async fn run(mut self) -> i32 {
        if let Some(reason) = self.session_end() {
            return self.coordinator.shutdown(reason).await.exit_code;
        }

        while let Some(event) = self.rx.recv().await {
            let reason = match event {
                SupervisorEvent::Exited {
                    index,
                    generation,
                    code,
                } => self.handle_exit(index, generation, code),
                SupervisorEvent::Respawn { index, generation } => {
                    self.respawn(index, generation);
                    None
                }
                SupervisorEvent::Restart(index) => {
                    self.restart(index);
                    None
                }
                SupervisorEvent::Kill(index) => {
                    self.kill(index);
                    None
                }
                SupervisorEvent::Input(bytes) => {
                    self.forward_input(bytes);
                    None
                }
                SupervisorEvent::ShowTasks(mode) => {
                    self.show_tasks(mode);
                    None
                }
            };

            if let Some(reason) = reason.or_else(|| self.session_end()) {
                return self.coordinator.shutdown(reason).await.exit_code;
            }
        }

        0
    }

    fn handle_exit(&mut self, index: usize, generation: u64, code: Option<i32>) -> Option<ExitReason> {
        let task = self.tasks.get_mut(index)?;
        if generation != task.generation {
            debug!(index, generation, "ignoring exit of a replaced process");
            return None;
        }

        if let Some(pgid) = task.pgid.take() {
            self.groups.unregister(index, pgid);
        }
        task.stdin = None;

        match task.state {
            TaskState::Killing => {
                task.state = TaskState::Stopped;
                self.reporter.report(&TaskEvent::Killed {
                    tag: task.tag.clone(),
                });
                None
            }
            // the respawn picks it up
            TaskState::Restarting => None,
            TaskState::Running => {
                task.state = TaskState::Exited { code };
                if self.coordinator.is_shutting_down() {
                    return None;
                }
                if code == Some(0) {
                    self.reporter.report(&TaskEvent::Exited {
                        tag: task.tag.clone(),
                    });
                    return None;
                }

                self.reporter.report(&TaskEvent::Failed {
                    tag: task.tag.clone(),
                    code,
                });
                if self.options.watch && task.restarts < self.options.max_restarts {
                    task.restarts += 1;
                    self.reporter.report(&TaskEvent::AutoRestarting {
                        tag: task.tag.clone(),
                        attempt: task.restarts,
                        max: self.options.max_restarts,
                    });
                    self.spawn(index);
                    return None;
                }

                Some(ExitReason::TaskFailed {
                    label: task.spec.label.clone(),
                })
            }
            TaskState::Stopped | TaskState::Exited { .. } | TaskState::FailedToStart => None,
        }
    }

    fn restart(&mut self, index: usize) {
        let Some(task) = self.tasks.get_mut(index) else {
            debug!(index, "restart of unknown task");
            return;
        };
        if task.state == TaskState::Restarting {
            debug!(index, "restart already in progress");
            return;
        }

        self.reporter.report(&TaskEvent::Restarting {
            tag: task.tag.clone(),
        });

        let Some(pgid) = task.pgid.filter(|_| task.state.is_live()) else {
            task.state = TaskState::Restarting;
            let generation = task.generation;
            self.respawn(index, generation);
            return;
        };

        task.state = TaskState::Restarting;
        let generation = task.generation;
        let control = self.control.clone();
        let grace = self.options.restart_grace;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            terminate_group(&*control, pgid, grace).await;
            let _ = tx.send(SupervisorEvent::Respawn { index, generation });
        });
    }

    fn respawn(&mut self, index: usize, generation: u64) {
        let Some(task) = self.tasks.get(index) else {
            return;
        };
        if task.state != TaskState::Restarting || task.generation != generation {
            debug!(index, "respawn superseded");
            return;
        }
        if self.coordinator.is_shutting_down() {
            return;
        }
        self.spawn(index);
    }

    fn kill(&mut self, index: usize) {
        let Some(task) = self.tasks.get_mut(index) else {
            debug!(index, "kill of unknown task");
            return;
        };
        if task.state.is_stopped() {
            self.reporter.report(&TaskEvent::AlreadyStopped {
                tag: task.tag.clone(),
            });
            return;
        }

        task.state = TaskState::Killing;
        let Some(pgid) = task.pgid else {
            // restarting with the old process already gone
            task.state = TaskState::Stopped;
            self.reporter.report(&TaskEvent::Killed {
                tag: task.tag.clone(),
            });
            return;
        };

        let control = self.control.clone();
        let grace = self.options.restart_grace;
        tokio::spawn(async move {
            terminate_group(&*control, pgid, grace).await;
        });
    }

    fn forward_input(&mut self, bytes: Vec<u8>) {
        let Some(task) = self.stdin_target.and_then(|i| self.tasks.get_mut(i)) else {
            return;
        };
        let Some(stdin) = task.stdin.as_ref() else {
            return;
        };
        if stdin.send(bytes).is_err() {
            debug!(index = task.tag.index, "stdin writer gone, dropping pipe");
            task.stdin = None;
        }
    }

    fn show_tasks(&self, mode: SelectMode) {
        let entries = self
            .tasks
            .iter()
            .map(|t| TaskListEntry {
                tag: t.tag.clone(),
                state: t.state,
            })
            .collect();
        self.reporter.report(&TaskEvent::TaskList { mode, entries });
    }

    /// The session is over once nothing runs and nothing was stopped by hand
    fn session_end(&self) -> Option<ExitReason> {
        if self.tasks.iter().any(|t| t.state.is_live() || t.state == TaskState::Stopped) {
            return None;
        }
        if self.tasks.iter().any(|t| t.state == TaskState::FailedToStart) {
            return Some(ExitReason::Finished(1));
        }
        Some(ExitReason::Finished(0))
    }
}

/// The child leads its own group, so its pid is the group id. A child that
/// has already been reaped has no pid, and pgid 0 would mean our own group.
fn process_group_id(child: &Child) -> std::io::Result<u32> {
    child
        .id()
        .ok_or_else(|| std::io::Error::other("process exited before its id was read"))
}

/// Writes forwarded input to a child's stdin pipe off the supervisor loop
fn stdin_writer(index: usize, mut pipe: ChildStdin) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            let written = match pipe.write_all(&bytes).await {
                Ok(()) => pipe.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                debug!(index, error = %e, "stdin closed, dropping pipe");
                break;
            }
        }
    });
    tx
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exit::ExitGrace;
    use crate::group::SystemGroups;
    use crate::reporter::{CollectingReporter, OutputGate};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::process::Command;

    /// Runs `sh -c <script>` where the script is looked up by task name
    struct ShellLauncher {
        scripts: HashMap<String, String>,
    }

    impl ShellLauncher {
        fn new(scripts: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(name, script)| (name.to_string(), script.to_string()))
                    .collect(),
            })
        }
    }

    impl Launcher for ShellLauncher {
        fn command(&self, spec: &TaskSpec) -> Command {
            match self.scripts.get(&spec.name) {
                Some(script) => {
                    let mut cmd = Command::new("sh");
                    cmd.arg("-c").arg(script);
                    cmd
                }
                None => Command::new("/nonexistent/gantry-test-runner"),
            }
        }
    }

    /// Real signals, recorded
    #[derive(Default)]
    struct SpyGroups {
        sent: Mutex<Vec<(u32, GroupSignal)>>,
    }

    impl SpyGroups {
        fn terms(&self) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, s)| *s == GroupSignal::Terminate)
                .count()
        }
    }

    impl ProcessGroupControl for SpyGroups {
        fn signal(&self, pgid: u32, signal: GroupSignal) -> std::io::Result<()> {
            self.sent.lock().unwrap().push((pgid, signal));
            SystemGroups.signal(pgid, signal)
        }

        fn is_alive(&self, pgid: u32) -> bool {
            SystemGroups.is_alive(pgid)
        }
    }

    struct Harness {
        coordinator: Arc<ExitCoordinator>,
        reporter: Arc<CollectingReporter>,
        spy: Arc<SpyGroups>,
    }

    impl Harness {
        fn new() -> Self {
            let spy = Arc::new(SpyGroups::default());
            let coordinator = ExitCoordinator::unguarded(
                LiveGroups::new(),
                spy.clone(),
                OutputGate::new(),
                ExitGrace {
                    interrupt: Duration::from_millis(50),
                    terminate: Duration::from_millis(100),
                },
            );
            Self {
                coordinator,
                reporter: Arc::new(CollectingReporter::default()),
                spy,
            }
        }

        fn supervisor(&self, options: SupervisorOptions, launcher: Arc<ShellLauncher>) -> Supervisor {
            Supervisor::new(
                options,
                launcher,
                self.coordinator.clone(),
                self.reporter.clone(),
            )
        }

        fn count(&self, pred: impl Fn(&TaskEvent) -> bool) -> usize {
            self.reporter.events().iter().filter(|&e| pred(e)).count()
        }

        async fn wait_for(&self, pred: impl Fn(&TaskEvent) -> bool) {
            for _ in 0..250 {
                if self.count(&pred) > 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("timed out; events: {:?}", self.reporter.events());
        }
    }

    fn options(watch: bool) -> SupervisorOptions {
        SupervisorOptions {
            watch,
            max_restarts: 3,
            restart_grace: Duration::from_millis(50),
            stdin_target: None,
        }
    }

    fn specs(names: &[&str]) -> Vec<TaskSpec> {
        names.iter().map(|n| TaskSpec::new(*n, ".")).collect()
    }

    fn label_is(event: &TaskEvent, want: &str) -> bool {
        let tag = match event {
            TaskEvent::Started { tag, .. }
            | TaskEvent::Exited { tag }
            | TaskEvent::Failed { tag, .. }
            | TaskEvent::AutoRestarting { tag, .. }
            | TaskEvent::Restarting { tag }
            | TaskEvent::Killed { tag }
            | TaskEvent::AlreadyStopped { tag }
            | TaskEvent::SpawnFailed { tag, .. } => tag,
            _ => return false,
        };
        tag.label == want
    }

    #[tokio::test]
    async fn test_watch_respawns_until_budget_then_escalates() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[
            ("web", "exit 1"),
            ("api", "sleep 30"),
            ("worker", "sleep 30"),
        ]);
        let mut sup = h.supervisor(options(true), launcher);
        sup.start(specs(&["web", "api", "worker"]));

        let code = tokio::time::timeout(Duration::from_secs(10), sup.run())
            .await
            .expect("session should end");

        assert_eq!(code, 1);
        let auto = h.count(|e| matches!(e, TaskEvent::AutoRestarting { .. }));
        let web_failures =
            h.count(|e| matches!(e, TaskEvent::Failed { .. }) && label_is(e, "web"));
        let web_starts = h.count(|e| matches!(e, TaskEvent::Started { .. }) && label_is(e, "web"));
        assert_eq!(auto, 3);
        assert_eq!(web_failures, 4);
        assert_eq!(web_starts, 4);
        assert_eq!(
            h.count(|e| matches!(e, TaskEvent::Failed { .. }) && !label_is(e, "web")),
            0
        );

        let report = h.coordinator.report().cloned().unwrap();
        assert_eq!(
            report.reason,
            ExitReason::TaskFailed {
                label: "web".into()
            }
        );
        assert_eq!(report.stopped, vec!["api", "worker"]);
    }

    #[tokio::test]
    async fn test_failure_without_watch_escalates_immediately() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "exit 2"), ("api", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web", "api"]));

        let code = tokio::time::timeout(Duration::from_secs(10), sup.run())
            .await
            .unwrap();

        assert_eq!(code, 1);
        assert_eq!(h.count(|e| matches!(e, TaskEvent::AutoRestarting { .. })), 0);
    }

    #[tokio::test]
    async fn test_kill_twice_signals_once() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30"), ("api", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web", "api"]));
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        handle.kill(0).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::Killed { .. })).await;
        handle.kill(0).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::AlreadyStopped { .. }))
            .await;

        assert_eq!(h.spy.terms(), 1);
        // a killed task is not a failure
        assert_eq!(h.count(|e| matches!(e, TaskEvent::Failed { .. })), 0);
        assert!(!run.is_finished());

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }

    #[tokio::test]
    async fn test_restart_replaces_process_without_escalating() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web"]));
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        handle.restart(0).unwrap();
        for _ in 0..250 {
            if h.count(|e| matches!(e, TaskEvent::Started { .. })) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(h.count(|e| matches!(e, TaskEvent::Started { .. })), 2);
        assert_eq!(h.count(|e| matches!(e, TaskEvent::Failed { .. })), 0);
        assert!(!run.is_finished());

        // the replacement is the one registered for shutdown
        let pids: Vec<u32> = h
            .reporter
            .events()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Started { pid, .. } => Some(*pid),
                _ => None,
            })
            .collect();
        let live = h.coordinator.groups().snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].pgid, pids[1]);

        let code = {
            h.coordinator.shutdown(ExitReason::Interrupt).await;
            tokio::time::timeout(Duration::from_secs(10), run)
                .await
                .unwrap()
                .unwrap()
        };
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_restart_after_kill_starts_again() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web"]));
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        handle.kill(0).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::Killed { .. })).await;
        handle.restart(0).unwrap();
        for _ in 0..250 {
            if h.count(|e| matches!(e, TaskEvent::Started { .. })) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.count(|e| matches!(e, TaskEvent::Started { .. })), 2);

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }

    #[tokio::test]
    async fn test_session_ends_cleanly_when_all_tasks_finish() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("build", "echo built"), ("lint", "true")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["build", "lint"]));

        let code = tokio::time::timeout(Duration::from_secs(10), sup.run())
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(h.count(|e| matches!(e, TaskEvent::Exited { .. })), 2);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_isolated() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["missing", "web"]));
        let run = tokio::spawn(sup.run());

        h.wait_for(|e| matches!(e, TaskEvent::Started { .. })).await;
        assert_eq!(
            h.count(|e| matches!(e, TaskEvent::SpawnFailed { .. }) && label_is(e, "missing")),
            1
        );
        assert!(!run.is_finished());

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }

    #[tokio::test]
    async fn test_all_spawns_failing_ends_with_error() {
        let h = Harness::new();
        let mut sup = h.supervisor(options(false), ShellLauncher::new(&[]));
        sup.start(specs(&["a", "b"]));

        assert_eq!(sup.run().await, 1);
    }

    #[tokio::test]
    async fn test_groups_spawned_after_shutdown_are_killed() {
        let h = Harness::new();
        // shutdown lands before either task has been spawned
        h.coordinator.shutdown(ExitReason::Interrupt).await;

        let launcher = ShellLauncher::new(&[("web", "sleep 30"), ("api", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web", "api"]));

        let code = tokio::time::timeout(Duration::from_secs(10), sup.run())
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert!(h.coordinator.groups().snapshot().is_empty());
        let kills = h
            .spy
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == GroupSignal::Kill)
            .count();
        assert_eq!(kills, 2);
        assert_eq!(h.count(|e| matches!(e, TaskEvent::Failed { .. })), 0);
    }

    #[tokio::test]
    async fn test_stdin_target_defaults_to_last_task() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30"), ("api", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(specs(&["web", "api"]));

        assert_eq!(sup.stdin_target(), Some(1));
        h.coordinator.shutdown(ExitReason::Interrupt).await;
    }

    #[tokio::test]
    async fn test_input_reaches_named_stdin_target() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[
            ("web", "read line; echo \"got $line\"; sleep 30"),
            ("api", "sleep 30"),
        ]);
        let mut named = options(false);
        named.stdin_target = Some("web".into());
        let mut sup = h.supervisor(named, launcher);
        sup.start(specs(&["web", "api"]));
        assert_eq!(sup.stdin_target(), Some(0));
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        handle.send_input(b"hello\n".to_vec()).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::Output { line, .. } if line == "got hello"))
            .await;

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }

    #[tokio::test]
    async fn test_reaped_child_has_no_group_id() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = process_group_id(&child).unwrap();
        assert!(pid > 0);

        child.wait().await.unwrap();
        assert!(process_group_id(&child).is_err());
    }

    #[tokio::test]
    async fn test_unread_stdin_does_not_stall_commands() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30"), ("api", "sleep 30")]);
        let mut named = options(false);
        named.stdin_target = Some("web".into());
        let mut sup = h.supervisor(named, launcher);
        sup.start(specs(&["web", "api"]));
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        // far more than a pipe buffer holds; `sleep` never reads it
        handle.send_input(vec![b'x'; 1 << 20]).unwrap();
        handle.kill(1).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::Killed { .. }) && label_is(e, "api"))
            .await;
        assert!(!run.is_finished());

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }

    #[tokio::test]
    async fn test_task_list_reports_states() {
        let h = Harness::new();
        let launcher = ShellLauncher::new(&[("web", "sleep 30")]);
        let mut sup = h.supervisor(options(false), launcher);
        sup.start(vec![
            TaskSpec::new("web", ".").with_label("web dev"),
            TaskSpec::new("missing", ".").with_label("api dev"),
        ]);
        assert_eq!(sup.shortcuts(), vec!["w", "a"]);
        let handle = sup.handle();
        let run = tokio::spawn(sup.run());

        handle.show_tasks(SelectMode::Kill).unwrap();
        h.wait_for(|e| matches!(e, TaskEvent::TaskList { .. })).await;

        let entries = h
            .reporter
            .events()
            .into_iter()
            .find_map(|e| match e {
                TaskEvent::TaskList { mode, entries } => {
                    assert_eq!(mode, SelectMode::Kill);
                    Some(entries)
                }
                _ => None,
            })
            .unwrap();
        let states: Vec<_> = entries.iter().map(|e| e.state).collect();
        assert_eq!(states, vec![TaskState::Running, TaskState::FailedToStart]);

        h.coordinator.shutdown(ExitReason::Interrupt).await;
        run.abort();
    }
}
