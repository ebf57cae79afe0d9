//! Workspace detection and management

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, GantryError, ResolveError, Result};

use super::manifest::{Manifest, MANIFEST_FILE};

/// Package manager that runs manifest scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    /// Executable name looked up on `PATH`
    pub fn executable(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Arguments that run `task` with `extra` forwarded to the script
    pub fn run_args(&self, task: &str, extra: &[String]) -> Vec<String> {
        let mut args = vec!["run".to_string(), task.to_string()];
        if !extra.is_empty() {
            // npm swallows flags meant for the script unless they follow `--`
            if *self == Self::Npm {
                args.push("--".to_string());
            }
            args.extend(extra.iter().cloned());
        }
        args
    }

    /// Guess the package manager from lockfiles in `root`
    pub fn detect(root: &Path) -> Self {
        if root.join("pnpm-lock.yaml").exists() || root.join("pnpm-workspace.yaml").exists() {
            Self::Pnpm
        } else if root.join("bun.lockb").exists() || root.join("bun.lock").exists() {
            Self::Bun
        } else if root.join("yarn.lock").exists() {
            Self::Yarn
        } else {
            Self::Npm
        }
    }
}

impl FromStr for PackageManager {
    type Err = GantryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            "bun" => Ok(Self::Bun),
            other => Err(ConfigError::InvalidValue {
                field: "resolver.runner".to_string(),
                message: format!("unknown package manager '{}'", other),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.executable())
    }
}

/// Represents a detected workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root path of the workspace
    pub root: PathBuf,
    /// Root manifest
    pub manifest: Manifest,
    /// Package manager that runs scripts
    pub package_manager: PackageManager,
    /// Glob patterns for package locations
    pub package_patterns: Vec<String>,
}

impl Workspace {
    /// Create a new workspace
    pub fn new(root: PathBuf, manifest: Manifest, package_manager: PackageManager) -> Self {
        Self {
            root,
            manifest,
            package_manager,
            package_patterns: Vec::new(),
        }
    }

    /// Whether the root manifest lists no workspaces
    pub fn is_single_package(&self) -> bool {
        self.package_patterns.is_empty()
    }

    /// Detect workspace configuration from a directory
    pub fn detect(path: &Path) -> Result<Option<Self>> {
        debug!(path = %path.display(), "detecting workspace type");
        let registry = super::detector::WorkspaceDetectorRegistry::new();
        registry.detect(path)
    }

    /// Read the root manifest, failing loudly if it is malformed
    fn read_root_manifest(path: &Path) -> Result<Option<Manifest>> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }
        Manifest::read(&manifest_path).map(Some).map_err(|e| {
            ResolveError::InvalidManifest {
                path: manifest_path,
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Detect pnpm workspace
    pub(crate) fn detect_pnpm(path: &Path) -> Result<Option<Self>> {
        let pnpm_workspace = path.join("pnpm-workspace.yaml");
        if !pnpm_workspace.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&pnpm_workspace)?;

        #[derive(Deserialize)]
        struct PnpmWorkspace {
            packages: Option<Vec<String>>,
        }

        let config: PnpmWorkspace = serde_yaml::from_str(&content).unwrap_or(PnpmWorkspace {
            packages: None,
        });

        let manifest = Self::read_root_manifest(path)?.unwrap_or_default();
        let mut ws = Workspace::new(path.to_path_buf(), manifest, PackageManager::Pnpm);
        ws.package_patterns = config.packages.unwrap_or_else(|| vec!["packages/*".to_string()]);
        Ok(Some(ws))
    }

    /// Detect npm, Yarn or Bun workspaces from `package.json`
    pub(crate) fn detect_package_json(path: &Path) -> Result<Option<Self>> {
        let Some(mut manifest) = Self::read_root_manifest(path)? else {
            return Ok(None);
        };

        let patterns = manifest
            .workspaces
            .take()
            .map(|w| w.into_patterns())
            .unwrap_or_default();

        let mut ws = Workspace::new(path.to_path_buf(), manifest, PackageManager::detect(path));
        ws.package_patterns = patterns;
        Ok(Some(ws))
    }
}
