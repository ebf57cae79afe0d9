//! Error types for the supervision engine

use thiserror::Error;

/// Result type alias using SupervisorError
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors raised while setting up or driving supervised tasks
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A second exit coordinator was constructed in this process
    #[error("An exit coordinator is already installed in this process")]
    CoordinatorInstalled,

    /// The package manager executable is not on PATH
    #[error("Runner '{runner}' not found on PATH: {source}")]
    RunnerNotFound {
        runner: String,
        #[source]
        source: which::Error,
    },

    /// The OS refused to start a task
    #[error("Failed to spawn '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// The supervisor loop is gone
    #[error("Supervisor is not running")]
    Closed,
}
