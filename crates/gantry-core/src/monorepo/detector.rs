//! Pluggable detection of the workspace layout around a root `package.json`

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;

use super::workspace::Workspace;

/// Trait for workspace detectors
pub trait WorkspaceDetector: Send + Sync {
    fn name(&self) -> &'static str;
    /// `Ok(None)` when this detector does not recognise the directory
    fn detect(&self, path: &Path) -> Result<Option<Workspace>>;
}

/// Detectors tried in registration order; pnpm comes first by default
pub struct WorkspaceDetectorRegistry {
    detectors: Vec<Box<dyn WorkspaceDetector>>,
}

impl WorkspaceDetectorRegistry {
    pub fn new() -> Self {
        Self {
            detectors: vec![Box::new(PnpmDetector), Box::new(PackageJsonDetector)],
        }
    }

    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Register an additional detector
    pub fn register(&mut self, detector: Box<dyn WorkspaceDetector>) {
        self.detectors.push(detector);
    }

    /// Try each detector in order, returning the first match
    pub fn detect(&self, path: &Path) -> Result<Option<Workspace>> {
        debug!(path = %path.display(), detectors = self.detectors.len(), "running workspace detection");
        for detector in &self.detectors {
            if let Some(ws) = detector.detect(path)? {
                info!(
                    detector = detector.name(),
                    package_manager = %ws.package_manager,
                    path = %path.display(),
                    "workspace detected"
                );
                return Ok(Some(ws));
            }
        }
        debug!(path = %path.display(), "no workspace detected");
        Ok(None)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }
}

impl Default for WorkspaceDetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects pnpm workspaces (`pnpm-workspace.yaml`)
pub struct PnpmDetector;

impl WorkspaceDetector for PnpmDetector {
    fn name(&self) -> &'static str {
        "pnpm"
    }

    fn detect(&self, path: &Path) -> Result<Option<Workspace>> {
        Workspace::detect_pnpm(path)
    }
}

/// Detects npm, Yarn and Bun workspaces (`package.json`)
pub struct PackageJsonDetector;

impl WorkspaceDetector for PackageJsonDetector {
    fn name(&self) -> &'static str {
        "package_json"
    }

    fn detect(&self, path: &Path) -> Result<Option<Workspace>> {
        Workspace::detect_package_json(path)
    }
}
