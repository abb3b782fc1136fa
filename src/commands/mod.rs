//! Command implementations for queuelock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, and the shared config loading every command starts from.

mod demo;
mod hold;
mod queue;

use crate::cli::{Cli, Command};
use queuelock::LockConfig;
use queuelock::error::Result;
use std::path::Path;
use tracing::debug;

/// Dispatch a command to its implementation.
///
/// Returns the process exit code on success.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let Cli {
        config,
        endpoint,
        command,
    } = cli;

    match command {
        Command::Hold(args) => hold::cmd_hold(&load_config(config.as_deref(), endpoint)?, args),
        Command::Queue(args) => queue::cmd_queue(&load_config(config.as_deref(), endpoint)?, args),
        Command::Demo(args) => demo::cmd_demo(args),
    }
}

/// Load the config file (or defaults) and apply command-line overrides.
fn load_config(path: Option<&Path>, endpoint: Option<String>) -> Result<LockConfig> {
    let mut config = match path {
        Some(path) => LockConfig::load(path)?,
        None => LockConfig::default(),
    };
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    config.validate()?;
    debug!(endpoint = %config.endpoint, root = %config.root, "configuration loaded");
    Ok(config)
}
