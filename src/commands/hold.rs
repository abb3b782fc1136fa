//! Implementation of the `queuelock hold` command.

use crate::cli::HoldArgs;
use queuelock::error::{LockError, Result};
use queuelock::{LockConfig, LockHandle, ReleaseOutcome, Session};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Acquire the lock, run the command, release the lock.
///
/// The command's exit code becomes ours. A command killed by a signal exits 1.
pub fn cmd_hold(config: &LockConfig, args: HoldArgs) -> Result<i32> {
    let Some((program, program_args)) = args.command.split_first() else {
        return Err(LockError::Config("no command given".to_string()));
    };

    let mut options = config.lock_options();
    options.purpose = args.command.join(" ");
    if let Some(ms) = args.timeout_ms {
        options.acquire_timeout = Some(Duration::from_millis(ms));
    }

    let session = Session::connect(config);
    let mut handle = LockHandle::with_options(Arc::clone(&session), &args.lock, options);

    let guard = handle.acquire()?;
    info!(lock = %args.lock, command = %program, "running command under lock");
    let status = Command::new(program).args(program_args).status();
    let outcome = guard.release()?;
    drop(handle);
    session.close()?;

    if outcome == ReleaseOutcome::AlreadyLost {
        eprintln!(
            "Warning: lock '{}' was lost while the command ran (session expired?)",
            args.lock
        );
    }

    let status = status.map_err(|e| {
        LockError::Config(format!("failed to run command '{}': {}", program, e))
    })?;
    Ok(status.code().unwrap_or(1))
}
