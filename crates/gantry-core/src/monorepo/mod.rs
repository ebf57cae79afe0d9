//! Monorepo support for task resolution
//!
//! This module provides:
//! - Workspace detection (npm, pnpm, yarn, bun)
//! - Bounded-depth package discovery filtered by workspace globs
//! - Resolution of requested script names into launchable tasks

pub mod detector;
pub mod discovery;
pub mod manifest;
pub mod resolver;
pub mod workspace;

pub use detector::{WorkspaceDetector, WorkspaceDetectorRegistry};
pub use discovery::{DiscoveredPackage, PackageDiscovery, WorkspacePatterns};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use resolver::{
    parse_running_tasks, ForwardPolicy, ResolveRequest, ResolvedTask, TaskResolver,
    RUNNING_TASKS_ENV,
};
pub use workspace::{PackageManager, Workspace};
