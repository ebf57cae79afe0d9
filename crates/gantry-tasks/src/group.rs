//! Process-group signalling and the registry of live groups

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

/// Signals sent to a whole process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask politely (SIGTERM)
    Terminate,
    /// Force (SIGKILL)
    Kill,
}

/// Platform boundary for signalling process groups.
///
/// Tasks are spawned as group leaders, so the group id equals the leader's pid.
pub trait ProcessGroupControl: Send + Sync {
    /// Deliver `signal` to every process in the group. A group that no
    /// longer exists is not an error.
    fn signal(&self, pgid: u32, signal: GroupSignal) -> std::io::Result<()>;

    /// Whether any process in the group still exists
    fn is_alive(&self, pgid: u32) -> bool;
}

/// Process groups of the host OS
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGroups;

#[cfg(unix)]
impl ProcessGroupControl for SystemGroups {
    fn signal(&self, pgid: u32, signal: GroupSignal) -> std::io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(pgid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_alive(&self, pgid: u32) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        killpg(Pid::from_raw(pgid as i32), None).is_ok()
    }
}

#[cfg(not(unix))]
impl ProcessGroupControl for SystemGroups {
    fn signal(&self, pgid: u32, _signal: GroupSignal) -> std::io::Result<()> {
        debug!(pgid, "process groups are not supported on this platform");
        Ok(())
    }

    fn is_alive(&self, _pgid: u32) -> bool {
        false
    }
}

/// SIGTERM the group, wait `grace`, then SIGKILL it if anything survived.
///
/// Returns `true` when the forced kill was needed.
pub async fn terminate_group(ctl: &dyn ProcessGroupControl, pgid: u32, grace: Duration) -> bool {
    if let Err(e) = ctl.signal(pgid, GroupSignal::Terminate) {
        warn!(pgid, error = %e, "failed to send SIGTERM to process group");
    }

    tokio::time::sleep(grace).await;

    if !ctl.is_alive(pgid) {
        return false;
    }

    debug!(pgid, "process group survived grace period, killing");
    if let Err(e) = ctl.signal(pgid, GroupSignal::Kill) {
        warn!(pgid, error = %e, "failed to send SIGKILL to process group");
    }
    true
}

/// A spawned process group known to the exit coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveGroup {
    /// Process group id
    pub pgid: u32,
    /// Label of the owning task
    pub label: String,
}

#[derive(Debug, Default)]
struct Registry {
    groups: BTreeMap<usize, LiveGroup>,
    closed: bool,
}

/// Registry shared between the supervisor (which registers groups as it
/// spawns them) and the exit coordinator (which reaps them on shutdown).
///
/// Once closed, registration is refused: a group spawned after shutdown
/// started must be killed by whoever spawned it.
#[derive(Debug, Clone, Default)]
pub struct LiveGroups {
    inner: Arc<Mutex<Registry>>,
}

impl LiveGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the group for task `index`. Returns `false` if shutdown has begun.
    pub fn register(&self, index: usize, group: LiveGroup) -> bool {
        let mut registry = self.lock();
        if registry.closed {
            return false;
        }
        registry.groups.insert(index, group);
        true
    }

    /// Forget the group for task `index`, unless it has already been replaced
    pub fn unregister(&self, index: usize, pgid: u32) {
        let mut registry = self.lock();
        if registry.groups.get(&index).is_some_and(|g| g.pgid == pgid) {
            registry.groups.remove(&index);
        }
    }

    /// Groups currently registered, in task order
    pub fn snapshot(&self) -> Vec<LiveGroup> {
        self.lock().groups.values().cloned().collect()
    }

    /// Refuse further registrations and hand back everything registered
    pub fn close(&self) -> Vec<LiveGroup> {
        let mut registry = self.lock();
        registry.closed = true;
        registry.groups.values().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Records signals instead of sending them
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingGroups {
    pub sent: Mutex<Vec<(u32, GroupSignal)>>,
    pub alive: Mutex<std::collections::HashSet<u32>>,
}

#[cfg(test)]
impl RecordingGroups {
    pub fn with_alive(pgids: &[u32]) -> Self {
        let groups = Self::default();
        groups.alive.lock().unwrap().extend(pgids.iter().copied());
        groups
    }

    pub fn sent(&self) -> Vec<(u32, GroupSignal)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ProcessGroupControl for RecordingGroups {
    fn signal(&self, pgid: u32, signal: GroupSignal) -> std::io::Result<()> {
        self.sent.lock().unwrap().push((pgid, signal));
        if signal == GroupSignal::Kill {
            self.alive.lock().unwrap().remove(&pgid);
        }
        Ok(())
    }

    fn is_alive(&self, pgid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pgid)
    }
}
