//! Task resolution: which directories run which requested tasks

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{ResolveError, Result};

use super::discovery::{DiscoveredPackage, PackageDiscovery};
use super::manifest::display_name;

/// Environment marker listing tasks already running in a parent session
pub const RUNNING_TASKS_ENV: &str = "GANTRY_RUNNING_TASKS";

/// Parse the inherited running-tasks marker
pub fn parse_running_tasks(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which resolved tasks receive pass-through arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardPolicy {
    /// Every task gets the extra arguments
    #[default]
    All,
    /// Only tasks named like the last requested task
    LastTaskOnly,
}

/// What the caller asked for
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Requested task names, in caller order
    pub tasks: Vec<String>,
    /// Whether root-level scripts are included
    pub include_root: bool,
    /// Arguments forwarded to the spawned tasks
    pub extra_args: Vec<String>,
    /// Which tasks get `extra_args`
    pub forward: ForwardPolicy,
    /// Tasks already running in a parent session
    pub already_running: BTreeSet<String>,
}

impl ResolveRequest {
    pub fn new(tasks: Vec<String>) -> Self {
        Self {
            tasks,
            include_root: true,
            ..Default::default()
        }
    }

    /// Requested names minus those running upstream, deduplicated in order
    pub fn effective_tasks(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.tasks
            .iter()
            .filter(|t| !self.already_running.contains(*t))
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// One task to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTask {
    /// Script name
    pub name: String,
    /// Directory the script runs in
    pub working_dir: PathBuf,
    /// Display label
    pub label: String,
    /// Workspace package name; `None` for root tasks
    pub package: Option<String>,
    /// Arguments forwarded to the script
    pub extra_args: Vec<String>,
}

/// Resolves requested task names against the root manifest and workspaces
pub struct TaskResolver {
    discovery: PackageDiscovery,
}

impl TaskResolver {
    pub fn new(discovery: PackageDiscovery) -> Self {
        Self { discovery }
    }

    /// Resolve tasks in spawn order: root tasks first, then workspace tasks
    pub fn resolve(&self, request: &ResolveRequest) -> Result<Vec<ResolvedTask>> {
        let tasks = self.resolve_unchecked(request)?;
        let wanted = request.effective_tasks();
        if tasks.is_empty() && !wanted.is_empty() {
            return Err(ResolveError::NoTasks(wanted).into());
        }
        Ok(tasks)
    }

    /// Like [`resolve`](Self::resolve), but an empty result is not an error
    pub fn resolve_unchecked(&self, request: &ResolveRequest) -> Result<Vec<ResolvedTask>> {
        let wanted = request.effective_tasks();
        if wanted.len() < request.tasks.len() {
            debug!(
                requested = ?request.tasks,
                running = ?request.already_running,
                "excluding tasks already running upstream"
            );
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let last = wanted.last().cloned();
        let args_for = |task: &str| -> Vec<String> {
            match request.forward {
                ForwardPolicy::All => request.extra_args.clone(),
                ForwardPolicy::LastTaskOnly if last.as_deref() == Some(task) => {
                    request.extra_args.clone()
                }
                ForwardPolicy::LastTaskOnly => Vec::new(),
            }
        };

        let workspace = self.discovery.workspace();
        let mut resolved = Vec::new();

        if request.include_root {
            for task in &wanted {
                if workspace.manifest.has_script(task) {
                    resolved.push(ResolvedTask {
                        name: task.clone(),
                        working_dir: workspace.root.clone(),
                        label: task.clone(),
                        package: None,
                        extra_args: args_for(task.as_str()),
                    });
                } else {
                    debug!(task = %task, "root manifest has no such script");
                }
            }
        }

        let packages = self.discovery.discover()?;
        resolved.extend(workspace_tasks(&packages, &wanted, args_for));

        info!(count = resolved.len(), "resolved tasks");
        Ok(resolved)
    }
}

/// Workspace tasks in directory order, then task name order
fn workspace_tasks(
    packages: &[DiscoveredPackage],
    wanted: &[String],
    args_for: impl Fn(&str) -> Vec<String>,
) -> Vec<ResolvedTask> {
    let mut tasks = Vec::new();
    for pkg in packages {
        let mut declared: Vec<&String> = wanted.iter().filter(|t| pkg.has_script(t.as_str())).collect();
        declared.sort();

        for task in declared {
            tasks.push(ResolvedTask {
                name: task.clone(),
                working_dir: pkg.path.clone(),
                label: format!("{} {}", display_name(&pkg.name), task),
                package: Some(pkg.name.clone()),
                extra_args: args_for(task.as_str()),
            });
        }
    }
    tasks
}
