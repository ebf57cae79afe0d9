//! Raw-mode keyboard input feeding the control surface

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gantry_tasks::{
    ControlEffect, ControlSurface, ExitCoordinator, ExitReason, SelectMode, Supervisor,
    SupervisorHandle, TaskEvent, TaskReporter,
};

use crate::cli::output;

/// Put the terminal in raw mode and build the control surface.
///
/// Returns `None` when stdin is not a terminal, raw mode is unavailable or
/// there is nothing to control. Raw mode is restored by the coordinator's
/// teardown hook.
pub fn enable(
    supervisor: &Supervisor,
    coordinator: &ExitCoordinator,
    raw: Arc<AtomicBool>,
) -> Option<ControlSurface> {
    let shortcuts = supervisor.shortcuts();
    if shortcuts.is_empty() || !std::io::stdin().is_terminal() {
        debug!("interactive controls disabled");
        return None;
    }

    if let Err(e) = crossterm::terminal::enable_raw_mode() {
        warn!(error = %e, "failed to enable raw mode");
        output::warning("Interactive controls are unavailable on this terminal");
        return None;
    }
    raw.store(true, Ordering::SeqCst);

    coordinator.set_teardown(Box::new(move || {
        async move {
            raw.store(false, Ordering::SeqCst);
            crossterm::terminal::disable_raw_mode()?;
            Ok::<_, anyhow::Error>(())
        }
        .boxed()
    }));

    Some(ControlSurface::new(shortcuts))
}

/// Read keystrokes until `input` closes, applying the surface's effects
pub async fn input_loop<R>(
    mut input: R,
    mut surface: ControlSurface,
    handle: SupervisorHandle,
    coordinator: Arc<ExitCoordinator>,
    reporter: Arc<dyn TaskReporter>,
    disambiguation: Duration,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<u64>();
    let mut timer: Option<JoinHandle<()>> = None;

    loop {
        let effects = tokio::select! {
            read = input.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => surface.feed(&buf[..n]),
                Err(e) => {
                    debug!(error = %e, "input read failed");
                    break;
                }
            },
            Some(token) = timer_rx.recv() => surface.timer_elapsed(token),
        };

        for effect in effects {
            match effect {
                ControlEffect::ArmTimer { token } => {
                    if let Some(previous) = timer.take() {
                        previous.abort();
                    }
                    let tx = timer_tx.clone();
                    timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(disambiguation).await;
                        let _ = tx.send(token);
                    }));
                }
                ControlEffect::CancelTimer => {
                    if let Some(previous) = timer.take() {
                        previous.abort();
                    }
                }
                ControlEffect::Exit => match coordinator.exit(ExitReason::Interrupt).await {},
                other => apply(other, &handle, reporter.as_ref()),
            }
        }
    }

    debug!("input closed");
}

fn apply(effect: ControlEffect, handle: &SupervisorHandle, reporter: &dyn TaskReporter) {
    let sent = match effect {
        ControlEffect::Forward(bytes) => handle.send_input(bytes),
        ControlEffect::ShowTasks(mode) => handle.show_tasks(mode),
        ControlEffect::Dispatch {
            mode: SelectMode::Restart,
            index,
        } => handle.restart(index),
        ControlEffect::Dispatch {
            mode: SelectMode::Kill,
            index,
        } => handle.kill(index),
        ControlEffect::Clear => {
            let cleared = crossterm::execute!(
                std::io::stdout(),
                crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
                crossterm::cursor::MoveTo(0, 0)
            );
            if let Err(e) = cleared {
                debug!(error = %e, "failed to clear screen");
            }
            Ok(())
        }
        ControlEffect::NoMatch { input } => {
            reporter.report(&TaskEvent::NoMatch { input });
            Ok(())
        }
        ControlEffect::Cancelled => {
            reporter.report(&TaskEvent::SelectCancelled);
            Ok(())
        }
        ControlEffect::Exit | ControlEffect::ArmTimer { .. } | ControlEffect::CancelTimer => Ok(()),
    };

    if let Err(e) = sent {
        debug!(error = %e, "supervisor is gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_tasks::{
        CollectingReporter, ExitGrace, Launcher, LiveGroups, OutputGate, SupervisorOptions,
        SystemGroups, TaskSpec, TracingReporter,
    };
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    // one installed coordinator per process
    static INSTALL: Mutex<()> = Mutex::new(());

    struct TrueLauncher;

    impl Launcher for TrueLauncher {
        fn command(&self, _spec: &TaskSpec) -> tokio::process::Command {
            tokio::process::Command::new("true")
        }
    }

    fn session() -> (Arc<ExitCoordinator>, Supervisor) {
        let coordinator = ExitCoordinator::install(
            LiveGroups::new(),
            Arc::new(SystemGroups),
            OutputGate::new(),
            ExitGrace::default(),
        )
        .unwrap();
        let supervisor = Supervisor::new(
            SupervisorOptions::default(),
            Arc::new(TrueLauncher),
            coordinator.clone(),
            Arc::new(TracingReporter),
        );
        (coordinator, supervisor)
    }

    fn no_matches(reporter: &CollectingReporter) -> Vec<String> {
        reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::NoMatch { input } => Some(input),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_effects_reach_supervisor_and_reporter() {
        let _serial = INSTALL.lock().unwrap_or_else(|e| e.into_inner());
        let (_coordinator, supervisor) = session();
        let handle = supervisor.handle();
        let reporter = CollectingReporter::default();
        let mut surface = ControlSurface::new(vec!["w".into(), "a".into()]);

        for effect in surface.feed(b"\x12z\x0bw") {
            apply(effect, &handle, &reporter);
        }
        drop(supervisor);
        // with the supervisor gone, sends fail quietly
        apply(ControlEffect::Forward(b"x".to_vec()), &handle, &reporter);

        let events = reporter.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TaskEvent::NoMatch { input } if input == "z"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_letter_restarts_the_disambiguation_timer() {
        let _serial = INSTALL.lock().unwrap_or_else(|e| e.into_inner());
        let (coordinator, supervisor) = session();
        let reporter = Arc::new(CollectingReporter::default());
        let (mut keys, input) = tokio::io::duplex(64);
        let surface = ControlSurface::new(vec!["abc".into(), "abd".into()]);
        let reading = tokio::spawn(input_loop(
            input,
            surface,
            supervisor.handle(),
            coordinator.clone(),
            reporter.clone(),
            Duration::from_millis(500),
        ));

        keys.write_all(b"\x12a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        keys.write_all(b"b").await.unwrap();

        // the first timer would have fired by now
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(no_matches(&reporter).is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(no_matches(&reporter), vec!["ab".to_string()]);

        drop(keys);
        reading.await.unwrap();
        assert_eq!(no_matches(&reporter).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_the_pending_timer() {
        let _serial = INSTALL.lock().unwrap_or_else(|e| e.into_inner());
        let (coordinator, supervisor) = session();
        let reporter = Arc::new(CollectingReporter::default());
        let (mut keys, input) = tokio::io::duplex(64);
        let surface = ControlSurface::new(vec!["abc".into(), "abd".into()]);
        let reading = tokio::spawn(input_loop(
            input,
            surface,
            supervisor.handle(),
            coordinator.clone(),
            reporter.clone(),
            Duration::from_millis(500),
        ));

        keys.write_all(b"\x0ba").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        keys.write_all(b"\x1b").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(no_matches(&reporter).is_empty());
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::SelectCancelled)));

        drop(keys);
        reading.await.unwrap();
    }
}
