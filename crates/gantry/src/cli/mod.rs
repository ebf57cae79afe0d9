//! CLI definition and command handling

pub mod args;
pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;

use commands::RunCommand;

/// Gantry - run package scripts across a monorepo side by side
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Unrecognised --flags (and their values) are passed through to the tasks.")]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress status messages; task output is still shown
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: search upward for gantry.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunCommand,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

impl Cli {
    /// Parse raw process arguments, splitting off pass-through arguments first
    pub fn parse_with_passthrough<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let program = args.next().unwrap_or_else(|| "gantry".to_string());
        let (own, passthrough) = args::split_passthrough(args);

        let mut cli = Self::parse_from(std::iter::once(program).chain(own));
        cli.run.passthrough = passthrough;
        cli
    }

    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        self.run.execute(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_passthrough() {
        let cli = Cli::parse_with_passthrough([
            "gantry", "dev", "--port", "3000", "--watch", "--stdin=web", "build",
        ]);
        assert_eq!(cli.run.tasks, vec!["dev", "build"]);
        assert!(cli.run.watch);
        assert_eq!(cli.run.stdin.as_deref(), Some("web"));
        assert_eq!(cli.run.passthrough, vec!["--port", "3000"]);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_with_passthrough([
            "gantry", "-C", "/tmp", "--format", "json", "--dry-run", "--no-root", "lint",
        ]);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.run.dry_run);
        assert!(cli.run.no_root);
        assert!(!cli.run.flags_last);
    }

    #[test]
    fn test_tasks_are_required() {
        assert!(Cli::try_parse_from(["gantry", "--watch"]).is_err());
    }
}
