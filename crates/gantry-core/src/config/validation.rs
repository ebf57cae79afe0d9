//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Package managers that can run manifest scripts
pub const KNOWN_RUNNERS: [&str; 4] = ["npm", "pnpm", "yarn", "bun"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_supervisor(config)?;
    validate_resolver(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_supervisor(config: &Config) -> Result<()> {
    let supervisor = &config.supervisor;

    if supervisor.interrupt_grace_ms > supervisor.terminate_grace_ms {
        return Err(ConfigError::InvalidValue {
            field: "supervisor.interrupt_grace_ms".to_string(),
            message: "must not exceed supervisor.terminate_grace_ms".to_string(),
        }
        .into());
    }

    if supervisor.disambiguation_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "supervisor.disambiguation_ms".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_resolver(config: &Config) -> Result<()> {
    if config.resolver.max_depth == 0 {
        return Err(ConfigError::InvalidValue {
            field: "resolver.max_depth".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if let Some(runner) = &config.resolver.runner {
        if !KNOWN_RUNNERS.contains(&runner.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "resolver.runner".to_string(),
                message: format!("must be one of: {}", KNOWN_RUNNERS.join(", ")),
            }
            .into());
        }
    }

    Ok(())
}
