//! Single-use handoff from a watch callback to the waiting thread.
//!
//! Each wait cycle allocates a fresh pair. The [`SignalTrigger`] is moved into
//! the watch callback and consumed by `fire`, so it can fire at most once; the
//! [`WaitSignal`] is consumed by `wait`, so it can be waited on at most once.
//! A stale watch from an earlier cycle can therefore never wake a later one.

use crate::coordination::{WatchedEvent, Watcher};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// Producer half, owned by the watch callback.
pub struct SignalTrigger {
    tx: SyncSender<WatchedEvent>,
}

/// Consumer half, owned by the waiting thread.
pub struct WaitSignal {
    rx: Receiver<WatchedEvent>,
}

/// Why `wait` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The watch fired.
    Fired(WatchedEvent),
    /// The timeout elapsed first.
    TimedOut,
    /// The trigger was dropped without firing (the service discarded the watch).
    Abandoned,
}

/// Allocate a fresh trigger/signal pair for one wait cycle.
pub fn wait_signal() -> (SignalTrigger, WaitSignal) {
    let (tx, rx) = mpsc::sync_channel(1);
    (SignalTrigger { tx }, WaitSignal { rx })
}

impl SignalTrigger {
    /// Wake the waiter. Never blocks, even if the waiter already gave up.
    pub fn fire(self, event: WatchedEvent) {
        let _ = self.tx.try_send(event);
    }

    /// Wrap the trigger as a one-shot watch callback.
    pub fn into_watcher(self) -> Watcher {
        Box::new(move |event| self.fire(event))
    }
}

impl WaitSignal {
    /// Block until the trigger fires, is dropped, or `timeout` elapses.
    /// `None` waits without limit.
    pub fn wait(self, timeout: Option<Duration>) -> WaitOutcome {
        match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(event) => WaitOutcome::Fired(event),
                Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => WaitOutcome::Abandoned,
            },
            None => match self.rx.recv() {
                Ok(event) => WaitOutcome::Fired(event),
                Err(_) => WaitOutcome::Abandoned,
            },
        }
    }
}
