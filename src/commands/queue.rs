//! Implementation of the `queuelock queue` command.

use crate::cli::QueueArgs;
use queuelock::error::{LockError, Result};
use queuelock::exit_codes;
use queuelock::locks::{Participant, queue};
use queuelock::{LockConfig, Session};
use serde_json::json;

/// Print the holder and waiters of a lock.
pub fn cmd_queue(config: &LockConfig, args: QueueArgs) -> Result<i32> {
    let session = Session::connect(config);
    let participants = queue(&session, &config.lock_options(), &args.lock)?;
    session.close()?;

    if args.json {
        println!("{}", render_json(&args.lock, &participants)?);
    } else {
        print!("{}", render_text(&args.lock, &participants));
    }
    Ok(exit_codes::SUCCESS)
}

fn render_text(lock: &str, participants: &[Participant]) -> String {
    if participants.is_empty() {
        return format!("Lock '{}' is free.\n", lock);
    }
    let mut out = format!(
        "Lock '{}': 1 holder, {} waiting\n",
        lock,
        participants.len() - 1
    );
    for participant in participants {
        out.push_str(&format!("  {}\n", participant));
    }
    out
}

fn render_json(lock: &str, participants: &[Participant]) -> Result<String> {
    let value = json!({
        "lock": lock,
        "participants": participants,
    });
    serde_json::to_string_pretty(&value)
        .map_err(|e| LockError::Config(format!("failed to render JSON: {}", e)))
}
