//! `package.json` parsing

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Manifest file name looked up in every workspace directory
pub const MANIFEST_FILE: &str = "package.json";

/// The parts of a `package.json` that task resolution cares about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Package name, possibly scoped (`@org/web`)
    pub name: Option<String>,

    /// Declared scripts; only the keys matter here
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    /// Workspace globs
    pub workspaces: Option<WorkspacesField>,
}

/// `workspaces` comes in two shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    Array(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl WorkspacesField {
    pub fn into_patterns(self) -> Vec<String> {
        match self {
            Self::Array(arr) => arr,
            Self::Object { packages } => packages,
        }
    }
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether this manifest declares a script with the given name
    pub fn has_script(&self, task: &str) -> bool {
        self.scripts.contains_key(task)
    }
}

/// Strip an npm scope from a package name (`@org/web` -> `web`)
pub fn display_name(package: &str) -> &str {
    match package.strip_prefix('@') {
        Some(scoped) => scoped.split_once('/').map(|(_, n)| n).unwrap_or(scoped),
        None => package,
    }
}
