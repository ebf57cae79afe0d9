//! Gantry Core - Core library for the Gantry task supervisor
//!
//! This crate provides the foundational error types, configuration loading,
//! workspace discovery and task resolution used by the supervisor.

pub mod config;
pub mod error;
pub mod monorepo;

pub use config::{Config, ResolverConfig, SupervisorConfig};
pub use error::{ConfigError, GantryError, ResolveError, Result};
pub use monorepo::{ResolveRequest, ResolvedTask, TaskResolver, Workspace};
