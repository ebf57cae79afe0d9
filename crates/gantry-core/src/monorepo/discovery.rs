//! Package discovery in monorepos

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};

use super::manifest::{Manifest, MANIFEST_FILE};
use super::workspace::Workspace;

/// A discovered package in the workspace
#[derive(Debug, Clone)]
pub struct DiscoveredPackage {
    /// Package name from the manifest, or the directory name
    pub name: String,
    /// Path to the package directory
    pub path: PathBuf,
    /// Path relative to the workspace root, `/`-separated
    pub relative_path: String,
    /// Declared script names
    pub scripts: Vec<String>,
}

impl DiscoveredPackage {
    /// Whether this package declares the given script
    pub fn has_script(&self, task: &str) -> bool {
        self.scripts.iter().any(|s| s == task)
    }
}

/// Compiled workspace globs, with `!pattern` exclusions
#[derive(Debug)]
pub struct WorkspacePatterns {
    include: GlobSet,
    exclude: GlobSet,
}

impl WorkspacePatterns {
    /// Compile workspace patterns.
    ///
    /// `*` matches within one path segment, `**` across segments; a pattern
    /// without metacharacters matches that exact path.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for raw in patterns {
            let (negated, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            let normalized = normalize_path(pattern);
            if normalized.is_empty() {
                continue;
            }

            let glob = GlobBuilder::new(&normalized)
                .literal_separator(true)
                .build()
                .map_err(|e| ResolveError::InvalidPattern {
                    pattern: raw.clone(),
                    message: e.to_string(),
                })?;

            if negated {
                exclude.add(glob);
            } else {
                include.add(glob);
            }
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| ResolveError::InvalidPattern {
                pattern: patterns.join(", "),
                message: e.to_string(),
            })
        };

        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
        })
    }

    /// Whether a root-relative path is a workspace
    pub fn matches(&self, relative_path: &str) -> bool {
        let normalized = normalize_path(relative_path);
        self.include.is_match(&normalized) && !self.exclude.is_match(&normalized)
    }
}

/// Strip `./` prefixes and trailing separators, and use `/` throughout
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Package discovery for workspaces
pub struct PackageDiscovery {
    workspace: Workspace,
    max_depth: usize,
    ignore: Vec<String>,
}

impl PackageDiscovery {
    /// Create a new package discovery instance
    pub fn new(workspace: Workspace, config: &ResolverConfig) -> Self {
        Self {
            workspace,
            max_depth: config.max_depth,
            ignore: config.ignore.clone(),
        }
    }

    /// The workspace being searched
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Discover all workspace packages, in enumeration order
    pub fn discover(&self) -> Result<Vec<DiscoveredPackage>> {
        debug!(
            root = %self.workspace.root.display(),
            patterns = self.workspace.package_patterns.len(),
            max_depth = self.max_depth,
            "discovering packages"
        );

        if self.workspace.is_single_package() {
            return Ok(Vec::new());
        }

        let patterns = WorkspacePatterns::new(&self.workspace.package_patterns)?;
        let mut packages = Vec::new();

        for dir in self.manifest_dirs() {
            let Some(relative_path) = self.relative(&dir) else {
                continue;
            };
            if !patterns.matches(&relative_path) {
                continue;
            }

            match self.parse_package(&dir, relative_path) {
                Ok(pkg) => packages.push(pkg),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping unreadable manifest");
                }
            }
        }

        info!(count = packages.len(), "discovered packages");
        Ok(packages)
    }

    /// Directories below the root that contain a manifest, bounded by depth
    fn manifest_dirs(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.workspace.root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.should_descend(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        !name.starts_with('.') && !self.ignore.iter().any(|i| i == name.as_ref())
    }

    fn relative(&self, dir: &Path) -> Option<String> {
        let rel = dir.strip_prefix(&self.workspace.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Parse a package from its manifest
    fn parse_package(&self, dir: &Path, relative_path: String) -> Result<DiscoveredPackage> {
        let manifest = Manifest::read(&dir.join(MANIFEST_FILE))?;
        let name = manifest.name.clone().unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| relative_path.clone())
        });

        Ok(DiscoveredPackage {
            name,
            path: dir.to_path_buf(),
            relative_path,
            scripts: manifest.scripts.into_keys().collect(),
        })
    }
}
