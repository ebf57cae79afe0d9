//! Run command - resolve tasks and supervise them until the session ends

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::{debug, info};

use gantry_core::config::{load_config, load_config_or_default};
use gantry_core::monorepo::{
    parse_running_tasks, ForwardPolicy, PackageDiscovery, PackageManager, RUNNING_TASKS_ENV,
};
use gantry_core::{Config, ResolveError, ResolveRequest, ResolvedTask, TaskResolver, Workspace};
use gantry_tasks::shortcut;
use gantry_tasks::{
    ExitCoordinator, ExitGrace, ExitReason, LiveGroups, OutputGate, RunnerLauncher, SelectMode,
    Stream, Supervisor, SupervisorOptions, SystemGroups, TaskEvent, TaskReporter,
    TaskReporterRegistry, TaskSpec,
};

use super::interactive;
use crate::cli::output::{self, line_ending};
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Run package scripts side by side
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Tasks to run (e.g., dev build)
    #[arg(required = true)]
    pub tasks: Vec<String>,

    /// Skip scripts declared in the root manifest
    #[arg(long)]
    pub no_root: bool,

    /// Restart failed tasks instead of ending the session
    #[arg(long)]
    pub watch: bool,

    /// Forward pass-through arguments only to the last requested task
    #[arg(long)]
    pub flags_last: bool,

    /// Task (name or label) that receives keyboard input
    #[arg(long, value_name = "NAME")]
    pub stdin: Option<String>,

    /// Print the resolved tasks and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Arguments forwarded to the tasks
    #[arg(skip)]
    pub passthrough: Vec<String>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        let code = runtime.block_on(self.execute_async(cli));
        // a pending read on stdin would otherwise hold the runtime open
        runtime.shutdown_background();
        code
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let config = load(cli.config.as_deref(), &cwd)?;

        let already_running = std::env::var(RUNNING_TASKS_ENV)
            .map(|v| parse_running_tasks(&v))
            .unwrap_or_default();
        let request = ResolveRequest {
            tasks: self.tasks.clone(),
            include_root: !self.no_root,
            extra_args: self.passthrough.clone(),
            forward: if self.flags_last {
                ForwardPolicy::LastTaskOnly
            } else {
                ForwardPolicy::All
            },
            already_running: already_running.clone(),
        };

        if request.effective_tasks().is_empty() {
            info!(tasks = ?self.tasks, "all requested tasks are already running upstream");
            if !cli.quiet {
                output::info("Requested tasks are already running in a parent session");
            }
            return Ok(exit_codes::SUCCESS);
        }

        let workspace =
            Workspace::detect(&cwd)?.ok_or_else(|| ResolveError::NoManifest(cwd.clone()))?;
        let runner = match &config.resolver.runner {
            Some(name) => PackageManager::from_str(name)?,
            None => workspace.package_manager,
        };
        debug!(root = %workspace.root.display(), %runner, "workspace detected");

        let resolver = TaskResolver::new(PackageDiscovery::new(workspace, &config.resolver));
        let resolved = resolver.resolve(&request)?;

        if self.dry_run {
            print_plan(&resolved, runner, cli)?;
            return Ok(exit_codes::SUCCESS);
        }

        let launcher = RunnerLauncher::locate(
            runner,
            &already_running,
            resolved.iter().map(|t| t.name.clone()),
        )?;

        // handlers must exist before the first spawn
        let signals = ShutdownSignals::install().context("Failed to install signal handlers")?;

        let gate = OutputGate::new();
        let coordinator = ExitCoordinator::install(
            LiveGroups::new(),
            Arc::new(SystemGroups),
            gate.clone(),
            ExitGrace::from(&config.supervisor),
        )?;

        let raw = Arc::new(AtomicBool::new(false));
        let mut reporters = TaskReporterRegistry::new();
        reporters.register(ConsoleReporter::new(gate, raw.clone(), cli.verbose, cli.quiet));
        let reporter: Arc<dyn TaskReporter> = Arc::new(reporters);

        let mut options = SupervisorOptions::from(&config.supervisor);
        options.watch |= self.watch;
        options.stdin_target = self.stdin.clone();

        let mut supervisor = Supervisor::new(
            options,
            Arc::new(launcher),
            coordinator.clone(),
            reporter.clone(),
        );
        tokio::spawn(listen_for_signals(signals, coordinator.clone()));
        supervisor.start(resolved.into_iter().map(TaskSpec::from).collect());

        if let Some(surface) = interactive::enable(&supervisor, &coordinator, raw) {
            tokio::spawn(interactive::input_loop(
                tokio::io::stdin(),
                surface,
                supervisor.handle(),
                coordinator.clone(),
                reporter,
                config.supervisor.disambiguation(),
            ));
        }

        let code = supervisor.run().await;
        Ok(coordinator.shutdown(ExitReason::Finished(code)).await.exit_code)
    }
}

fn load(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Config> {
    let (config, path): (Config, Option<PathBuf>) = match explicit {
        Some(path) => (
            load_config(path).with_context(|| format!("Failed to load {}", path.display()))?,
            Some(path.to_path_buf()),
        ),
        None => load_config_or_default(cwd)?,
    };
    if let Some(path) = path {
        debug!(path = %path.display(), "using config file");
    }
    Ok(config)
}

fn print_plan(resolved: &[ResolvedTask], runner: PackageManager, cli: &Cli) -> anyhow::Result<()> {
    let labels: Vec<&str> = resolved.iter().map(|t| t.label.as_str()).collect();
    let shortcuts = shortcut::allocate(&labels);

    if cli.format == OutputFormat::Json {
        let plan: Vec<serde_json::Value> = resolved
            .iter()
            .zip(&shortcuts)
            .map(|(task, shortcut)| {
                serde_json::json!({
                    "name": task.name,
                    "label": task.label,
                    "shortcut": shortcut,
                    "package": task.package,
                    "working_dir": task.working_dir,
                    "command": std::iter::once(runner.executable().to_string())
                        .chain(runner.run_args(&task.name, &task.extra_args))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} {} task{} via {}",
        style("→").blue(),
        resolved.len(),
        if resolved.len() == 1 { "" } else { "s" },
        style(runner).bold()
    );
    println!();
    for (task, shortcut) in resolved.iter().zip(&shortcuts) {
        println!(
            "  {:<6} {:<28} {}",
            output::shortcut_style().apply_to(shortcut),
            task.label,
            output::path_style().apply_to(task.working_dir.display())
        );
        if cli.verbose && !task.extra_args.is_empty() {
            println!("         {}", style(task.extra_args.join(" ")).dim());
        }
    }
    println!();
    println!("{}", style("[DRY RUN - no tasks will be started]").yellow().bold());
    Ok(())
}

/// SIGINT and SIGTERM streams. The handlers are in place from construction;
/// signals that arrive before the first `recv` are kept.
#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> ExitReason {
        tokio::select! {
            _ = self.interrupt.recv() => ExitReason::Interrupt,
            _ = self.terminate.recv() => ExitReason::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ExitReason {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        ExitReason::Interrupt
    }
}

/// Route the first shutdown signal to the exit coordinator
async fn listen_for_signals(mut signals: ShutdownSignals, coordinator: Arc<ExitCoordinator>) {
    let reason = signals.recv().await;
    info!(?reason, "received shutdown signal");
    match coordinator.exit(reason).await {}
}

/// Console reporter that prefixes task output
struct ConsoleReporter {
    gate: OutputGate,
    raw: Arc<AtomicBool>,
    verbose: bool,
    quiet: bool,
}

impl ConsoleReporter {
    fn new(gate: OutputGate, raw: Arc<AtomicBool>, verbose: bool, quiet: bool) -> Self {
        Self {
            gate,
            raw,
            verbose,
            quiet,
        }
    }

    fn eol(&self) -> &'static str {
        line_ending(self.raw.load(Ordering::SeqCst))
    }

    fn out(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}{}", text, self.eol());
        let _ = stdout.flush();
    }

    fn err(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{}{}", text, self.eol());
    }

    fn status(&self, text: &str) {
        if !self.quiet {
            self.out(text);
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        if !self.gate.admits(event) {
            return;
        }

        match event {
            TaskEvent::Output { tag, line, stream } => {
                let text = format!("{} {} {}", tag.prefix(), style("│").dim(), line);
                match stream {
                    Stream::Stdout => self.out(&text),
                    Stream::Stderr => self.err(&text),
                }
            }
            TaskEvent::Started { tag, pid } => {
                if self.verbose {
                    self.status(&format!(
                        "{} {} {}",
                        style("▸").dim(),
                        tag.prefix(),
                        style(format!("(pid {})", pid)).dim()
                    ));
                }
            }
            TaskEvent::Exited { tag } => {
                self.status(&format!("{} {} exited", style("✓").green(), tag.prefix()));
            }
            TaskEvent::Failed { tag, code } => {
                let why = match code {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                };
                self.err(&format!(
                    "{} {} failed {}",
                    style("✗").red().bold(),
                    tag.prefix(),
                    style(format!("({})", why)).red().dim()
                ));
            }
            TaskEvent::AutoRestarting { tag, attempt, max } => {
                self.status(&format!(
                    "{} restarting {} {}",
                    style("↻").yellow(),
                    tag.prefix(),
                    style(format!("({}/{})", attempt, max)).dim()
                ));
            }
            TaskEvent::Restarting { tag } => {
                self.status(&format!("{} restarting {}", style("↻").yellow(), tag.prefix()));
            }
            TaskEvent::Killed { tag } => {
                self.status(&format!("{} {} stopped", style("○").yellow(), tag.prefix()));
            }
            TaskEvent::AlreadyStopped { tag } => {
                self.status(&format!(
                    "{} {} is already stopped",
                    style("○").dim(),
                    tag.prefix()
                ));
            }
            TaskEvent::SpawnFailed { tag, error } => {
                self.err(&format!(
                    "{} failed to start {}: {}",
                    style("✗").red().bold(),
                    tag.prefix(),
                    style(error).red().dim()
                ));
            }
            TaskEvent::TaskList { mode, entries } => {
                let action = match mode {
                    SelectMode::Restart => "restart",
                    SelectMode::Kill => "kill",
                };
                self.out(&output::header(&format!(
                    "Type a shortcut to {} a task (Esc to cancel):",
                    action
                )));
                for entry in entries {
                    self.out(&format!(
                        "  {:<6} {:<28} {}",
                        output::shortcut_style().apply_to(&entry.tag.shortcut),
                        entry.tag.style().apply_to(&entry.tag.label),
                        style(entry.state).dim()
                    ));
                }
            }
            TaskEvent::NoMatch { input } => {
                self.out(&format!(
                    "{} no task matches '{}'",
                    style("!").yellow().bold(),
                    input
                ));
            }
            TaskEvent::SelectCancelled => {
                self.out(&style("cancelled").dim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[supervisor]\nmax_restarts = 5\n").unwrap();

        let config = load(Some(path.as_path()), temp.path()).unwrap();
        assert_eq!(config.supervisor.max_restarts, 5);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        let err = load(Some(missing.as_path()), temp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("nope.toml"));
    }

    #[test]
    fn test_load_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load(None, temp.path()).unwrap();
        assert_eq!(config.supervisor.max_restarts, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_before_first_poll_is_kept() {
        let mut signals = ShutdownSignals::install().unwrap();

        // delivered while nothing is polling, as during startup
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let reason = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("SIGTERM should be delivered to the stream");
        assert_eq!(reason, ExitReason::Terminate);
    }

    #[test]
    fn test_console_reporter_respects_gate() {
        let gate = OutputGate::new();
        let reporter = ConsoleReporter::new(gate.clone(), Arc::new(AtomicBool::new(true)), false, false);
        assert_eq!(reporter.eol(), "\r\n");

        gate.close();
        // silenced events return before touching the terminal
        reporter.report(&TaskEvent::NoMatch { input: "zz".into() });
        assert!(!gate.admits(&TaskEvent::NoMatch { input: "zz".into() }));
    }
}
