//! CLI commands

mod interactive;
mod run;

pub use run::RunCommand;
