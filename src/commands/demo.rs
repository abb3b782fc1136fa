//! Implementation of the `queuelock demo` command.

use crate::cli::DemoArgs;
use queuelock::coordination::memory::{MemoryService, WatchStats};
use queuelock::error::{LockError, Result};
use queuelock::exit_codes;
use queuelock::locks::sequence_of;
use queuelock::{LockHandle, Session};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const DEMO_LOCK: &str = "demo";

/// One grant, in the order grants happened.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    participant: usize,
    sequence: u64,
}

#[derive(Debug)]
struct DemoReport {
    grants: Vec<Grant>,
    stats: WatchStats,
}

/// Run contending participants on an in-process service and print who got
/// the lock when.
pub fn cmd_demo(args: DemoArgs) -> Result<i32> {
    if args.participants == 0 {
        return Err(LockError::Config(
            "--participants must be at least 1".to_string(),
        ));
    }

    let report = run_demo(args.participants, Duration::from_millis(args.hold_ms))?;

    println!("Acquisition order:");
    for (turn, grant) in report.grants.iter().enumerate() {
        println!(
            "  {:>3}. participant {} (request #{})",
            turn + 1,
            grant.participant,
            grant.sequence
        );
    }
    println!(
        "Watches armed: {}, fired: {}",
        report.stats.armed, report.stats.fired
    );
    Ok(exit_codes::SUCCESS)
}

fn run_demo(participants: usize, hold: Duration) -> Result<DemoReport> {
    let service = MemoryService::new();
    let session = Session::with_client("memory://demo", Arc::new(service.connect()?));
    let grants = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..participants)
        .map(|participant| {
            let mut handle = LockHandle::new(Arc::clone(&session), DEMO_LOCK);
            let grants = Arc::clone(&grants);
            thread::spawn(move || -> Result<()> {
                let guard = handle.acquire()?;
                let sequence = guard.node_path().and_then(sequence_of).unwrap_or_default();
                grants
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(Grant {
                        participant,
                        sequence,
                    });
                thread::sleep(hold);
                guard.release()?;
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker
            .join()
            .map_err(|_| LockError::Session("demo participant panicked".to_string()))??;
    }

    let stats = service.stats();
    session.close()?;
    let grants = grants.lock().unwrap_or_else(|p| p.into_inner()).clone();
    Ok(DemoReport { grants, stats })
}
