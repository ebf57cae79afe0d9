//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration for Gantry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process supervision settings
    pub supervisor: SupervisorConfig,

    /// Task resolution settings
    pub resolver: ResolverConfig,
}

/// Process supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Restart failed tasks instead of ending the session
    pub watch: bool,

    /// Auto-restart budget per task in watch mode
    pub max_restarts: u32,

    /// Delay between SIGTERM and SIGKILL when restarting or killing one task
    pub restart_grace_ms: u64,

    /// Grace period during shutdown triggered by an interrupt
    pub interrupt_grace_ms: u64,

    /// Grace period during shutdown triggered by SIGTERM or a task failure
    pub terminate_grace_ms: u64,

    /// How long an ambiguous shortcut prefix waits for more input
    pub disambiguation_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watch: false,
            max_restarts: 3,
            restart_grace_ms: 150,
            interrupt_grace_ms: 50,
            terminate_grace_ms: 200,
            disambiguation_ms: 500,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn disambiguation(&self) -> Duration {
        Duration::from_millis(self.disambiguation_ms)
    }
}

/// Task resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum directory depth searched for workspace manifests
    pub max_depth: usize,

    /// Directory names never descended into
    pub ignore: Vec<String>,

    /// Package manager used to run scripts (npm, pnpm, yarn, bun).
    /// Detected from lockfiles when unset.
    pub runner: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            ignore: vec![
                "node_modules".to_string(),
                "bower_components".to_string(),
                "vendor".to_string(),
                "target".to_string(),
            ],
            runner: None,
        }
    }
}
