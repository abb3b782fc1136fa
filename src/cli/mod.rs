//! CLI argument parsing for queuelock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// queuelock: fair distributed mutex over a coordination service.
///
/// Locks are queues of ephemeral, sequential nodes. The oldest request holds
/// the lock and every waiter watches only the request in front of it.
#[derive(Parser, Debug)]
#[command(name = "queuelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Coordination service endpoint (`host:port,...` or `memory://<name>`).
    /// Overrides the configuration file.
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for queuelock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hold a lock while running a command.
    ///
    /// Waits for the lock, runs the command, then releases the lock.
    /// Exits with the command's exit code.
    Hold(HoldArgs),

    /// Show who holds a lock and who is waiting for it.
    Queue(QueueArgs),

    /// Run several in-process participants contending for one lock.
    ///
    /// Uses the in-process coordination service; no server is needed.
    Demo(DemoArgs),
}

/// Arguments for the `hold` command.
#[derive(Parser, Debug)]
pub struct HoldArgs {
    /// Lock name.
    pub lock: String,

    /// Give up after this many milliseconds (exit code 4).
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Command to run while holding the lock.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the `queue` command.
#[derive(Parser, Debug)]
pub struct QueueArgs {
    /// Lock name.
    pub lock: String,

    /// Output JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `demo` command.
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Number of contending participants.
    #[arg(short, long, default_value_t = 5)]
    pub participants: usize,

    /// How long each participant holds the lock, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub hold_ms: u64,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
