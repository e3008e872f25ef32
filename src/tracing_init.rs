//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when it is set; otherwise the level from `[application]` applies to
//! the whole process.

use tracing_subscriber::EnvFilter;

use crate::config::RigConfig;
use crate::error::{AppResult, FluidicsError};

/// Build the filter for a configuration.
pub fn filter_from_config(config: &RigConfig) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.application.log_level)
            .map_err(|e| FluidicsError::Configuration(format!("invalid log filter: {}", e))),
    }
}

/// Install a global `fmt` subscriber. Fails if one is already installed.
pub fn init_from_config(config: &RigConfig) -> AppResult<()> {
    let filter = filter_from_config(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| FluidicsError::Configuration(format!("tracing already initialised: {}", e)))
}
