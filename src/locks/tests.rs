//! Tests for the locks subsystem.

use super::*;
use crate::config::TimeoutPolicy;
use crate::coordination::memory::MemoryService;
use crate::error::LockError;
use crate::exit_codes;
use crate::session::Session;
use crate::test_support::{TestCluster, wait_until};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const ROOT: &str = "/locks/orders";
const PATIENCE: Duration = Duration::from_secs(5);

fn remain_queued() -> LockOptions {
    LockOptions {
        on_timeout: TimeoutPolicy::RemainQueued,
        ..LockOptions::default()
    }
}

/// Run `handle` on a thread that locks, reports, then unlocks when told to.
fn spawn_holder(
    mut handle: LockHandle,
    name: &'static str,
    acquired: mpsc::Sender<&'static str>,
) -> (mpsc::Sender<()>, thread::JoinHandle<LockHandle>) {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let join = thread::spawn(move || {
        handle.lock().unwrap();
        acquired.send(name).unwrap();
        release_rx.recv().unwrap();
        assert_eq!(handle.unlock().unwrap(), ReleaseOutcome::Released);
        handle
    });
    (release_tx, join)
}

#[test]
fn test_lock_metadata_creation() {
    let meta = LockMetadata::new("nightly report");

    assert!(!meta.owner.is_empty());
    assert!(meta.owner.contains('@'));
    assert!(meta.pid.is_some());
    assert_eq!(meta.purpose, "nightly report");
}

#[test]
fn test_lock_metadata_roundtrip() {
    let meta = LockMetadata::new("deploy");
    let parsed = LockMetadata::from_bytes(&meta.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed, meta);
}

#[test]
fn test_lock_metadata_rejects_garbage() {
    assert!(LockMetadata::from_bytes(b"not json").is_err());
}

#[test]
fn test_lock_metadata_age_string() {
    let mut meta = LockMetadata::new("deploy");
    meta.created_at = chrono::Utc::now() - chrono::Duration::minutes(90);
    assert_eq!(meta.age_string(), "1h 30m");

    meta.created_at = chrono::Utc::now() - chrono::Duration::days(2);
    assert!(meta.age_string().starts_with("2d"));
}

#[test]
fn test_first_lock_on_free_name_holds_immediately() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    a.lock().unwrap();

    assert!(a.is_held());
    assert_eq!(a.state(), LockState::Holding);
    let node = a.node_path().unwrap().to_string();
    assert!(node.starts_with("/locks/orders/_c_"));
    assert_eq!(cluster.queue(ROOT).len(), 1);
    assert!(a.predecessor().is_none());
}

#[test]
#[serial]
fn test_waiters_acquire_in_request_order() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();
    let a_node = a.node_path().unwrap().to_string();

    let (acquired_tx, acquired_rx) = mpsc::channel();

    let (release_b, join_b) = spawn_holder(cluster.handle("orders"), "b", acquired_tx.clone());
    assert!(wait_until(PATIENCE, || cluster.queue(ROOT).len() == 2));
    let (release_c, join_c) = spawn_holder(cluster.handle("orders"), "c", acquired_tx);
    assert!(wait_until(PATIENCE, || cluster.queue(ROOT).len() == 3));

    let queue = cluster.queue(ROOT);
    let b_node = format!("{}/{}", ROOT, queue[1]);

    // Each waiter watches only the node directly in front of it.
    assert!(wait_until(PATIENCE, || {
        cluster.service.watch_count(&a_node) == 1 && cluster.service.watch_count(&b_node) == 1
    }));

    let fired_before = cluster.service.stats().fired;
    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::Released);

    assert_eq!(acquired_rx.recv_timeout(PATIENCE).unwrap(), "b");
    // Releasing A woke B only.
    assert_eq!(cluster.service.stats().fired - fired_before, 1);
    assert!(acquired_rx.try_recv().is_err());

    release_b.send(()).unwrap();
    assert_eq!(acquired_rx.recv_timeout(PATIENCE).unwrap(), "c");
    release_c.send(()).unwrap();

    join_b.join().unwrap();
    join_c.join().unwrap();
    assert!(cluster.queue(ROOT).is_empty());
}

#[test]
#[serial]
fn test_try_lock_for_times_out_and_withdraws() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let mut d = cluster.handle("orders");
    let started = Instant::now();
    let acquired = d.try_lock_for(Duration::from_millis(100)).unwrap();

    assert!(!acquired);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(d.state(), LockState::TimedOut);
    assert!(!d.is_held());
    assert!(d.node_path().is_none());
    assert_eq!(cluster.queue(ROOT).len(), 1);
    assert!(a.is_held());
}

#[test]
fn test_try_lock_does_not_wait() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    let mut b = cluster.handle("orders");

    assert!(a.try_lock().unwrap());
    assert!(!b.try_lock().unwrap());
    assert_eq!(cluster.queue(ROOT).len(), 1);

    a.unlock().unwrap();
    assert!(b.try_lock().unwrap());
}

#[test]
#[serial]
fn test_remain_queued_resumes_on_same_node() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let mut b = cluster.handle_with("orders", remain_queued());
    assert!(!b.try_lock_for(Duration::from_millis(50)).unwrap());
    assert_eq!(b.state(), LockState::TimedOut);
    let queued = b.node_path().unwrap().to_string();
    assert_eq!(cluster.queue(ROOT).len(), 2);

    a.unlock().unwrap();

    assert!(b.try_lock_for(PATIENCE).unwrap());
    assert_eq!(b.node_path(), Some(queued.as_str()));
    assert_eq!(cluster.queue(ROOT).len(), 1);
}

#[test]
#[serial]
fn test_lock_honours_acquire_timeout() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let mut b = cluster.handle_with(
        "orders",
        LockOptions {
            acquire_timeout: Some(Duration::from_millis(50)),
            ..LockOptions::default()
        },
    );
    let err = b.lock().unwrap_err();

    assert!(matches!(
        err,
        LockError::Timeout { ref lock, waited } if lock == "orders" && waited == Duration::from_millis(50)
    ));
    assert_eq!(err.exit_code(), exit_codes::LOCK_TIMEOUT);
    assert_eq!(cluster.queue(ROOT).len(), 1);
}

#[test]
#[serial]
fn test_mutual_exclusion_on_shared_session() {
    let cluster = TestCluster::new();
    let session = cluster.session();
    let inside = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let mut handle = LockHandle::new(Arc::clone(&session), "counter");
            let inside = Arc::clone(&inside);
            let entries = Arc::clone(&entries);
            thread::spawn(move || {
                for _ in 0..5 {
                    handle.lock().unwrap();
                    assert!(
                        !inside.swap(true, Ordering::SeqCst),
                        "two holders at once"
                    );
                    entries.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    inside.store(false, Ordering::SeqCst);
                    assert_eq!(handle.unlock().unwrap(), ReleaseOutcome::Released);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(entries.load(Ordering::SeqCst), 30);
    assert!(cluster.queue("/locks/counter").is_empty());
}

#[test]
#[serial]
fn test_holder_session_expiry_promotes_successor() {
    let cluster = TestCluster::new();
    let (session_a, id_a) = cluster.session_with_id();
    let mut a = LockHandle::new(session_a, "orders");
    a.lock().unwrap();

    let mut b = cluster.handle("orders");
    let waiter = thread::spawn(move || {
        b.lock().unwrap();
        b
    });
    assert!(wait_until(PATIENCE, || cluster.queue(ROOT).len() == 2));

    cluster.service.expire_session(id_a);

    let b = waiter.join().unwrap();
    assert!(b.is_held());
    assert_eq!(cluster.queue(ROOT).len(), 1);

    // A still believes it holds the lock until it tries to release.
    assert!(a.is_held());
    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::AlreadyLost);
    assert!(!a.is_held());
}

#[test]
#[serial]
fn test_withdrawn_predecessor_moves_watch_forward() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let mut b = cluster.handle_with("orders", remain_queued());
    assert!(!b.try_lock_for(Duration::from_millis(10)).unwrap());

    let (acquired_tx, acquired_rx) = mpsc::channel();
    let (release_c, join_c) = spawn_holder(cluster.handle("orders"), "c", acquired_tx);
    assert!(wait_until(PATIENCE, || cluster.queue(ROOT).len() == 3));

    // B leaves the queue while C is watching it; C must re-arm on A, not acquire.
    assert_eq!(b.unlock().unwrap(), ReleaseOutcome::Withdrawn);
    assert!(acquired_rx.recv_timeout(Duration::from_millis(100)).is_err());
    // Only C watches A: B dropped its watch when it timed out.
    let a_node = a.node_path().unwrap().to_string();
    assert!(wait_until(PATIENCE, || cluster.service.watch_count(&a_node) == 1));

    a.unlock().unwrap();
    assert_eq!(acquired_rx.recv_timeout(PATIENCE).unwrap(), "c");
    release_c.send(()).unwrap();
    join_c.join().unwrap();
}

#[test]
fn test_connection_failure_surfaces_on_first_lock() {
    let service = MemoryService::named("locks-tests-down");
    service.set_available(false);
    let session = Session::open("memory://locks-tests-down", Duration::from_secs(1));

    let mut handle = LockHandle::new(session, "orders");
    assert_eq!(handle.errors().len(), 1);

    let err = handle.lock().unwrap_err();
    assert!(matches!(err, LockError::Connection { .. }));
    assert_eq!(err.exit_code(), exit_codes::CONNECTION_FAILURE);

    // Still reported on later attempts.
    assert!(matches!(
        handle.try_lock().unwrap_err(),
        LockError::Connection { .. }
    ));
    assert_eq!(handle.state(), LockState::Idle);
    MemoryService::forget("locks-tests-down");
}

#[test]
fn test_invalid_lock_name_is_rejected() {
    let cluster = TestCluster::new();

    for name in ["", "a/b", "zookeeper"] {
        let mut handle = cluster.handle(name);
        let err = handle.lock().unwrap_err();
        assert!(matches!(err, LockError::InvalidLockName { .. }));
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }
}

#[test]
fn test_lock_is_not_reentrant() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    assert!(matches!(
        a.lock().unwrap_err(),
        LockError::AlreadyAcquired(ref name) if name == "orders"
    ));
    assert!(matches!(a.try_lock(), Err(LockError::AlreadyAcquired(_))));
    assert!(a.is_held());
    assert_eq!(cluster.queue(ROOT).len(), 1);
}

#[test]
fn test_relock_after_unlock_on_same_session() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    a.lock().unwrap();
    let first = a.node_path().unwrap().to_string();
    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::Released);
    assert_eq!(a.state(), LockState::Released);
    assert!(a.node_path().is_none());

    a.lock().unwrap();
    let second = a.node_path().unwrap().to_string();
    assert_ne!(first, second);
    assert!(sequence_of(&second) > sequence_of(&first));
}

#[test]
fn test_unlock_without_node_is_noop() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::NotHeld);
    assert_eq!(a.state(), LockState::Idle);
}

#[test]
fn test_unlock_after_external_delete_reports_lost() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let node = a.node_path().unwrap().to_string();
    cluster.service.delete_node(&node).unwrap();

    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::AlreadyLost);
}

#[test]
fn test_interrupted_create_adopts_existing_node() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle_with(
        "orders",
        LockOptions {
            retry: RetryPolicy {
                max_retries: 3,
                backoff: Duration::from_millis(5),
            },
            ..LockOptions::default()
        },
    );

    cluster.service.lose_connection_after_creates(1);
    a.lock().unwrap();

    let queue = cluster.queue(ROOT);
    assert_eq!(queue.len(), 1);
    assert_eq!(a.node_path(), Some(format!("{}/{}", ROOT, queue[0]).as_str()));
}

#[test]
fn test_interrupted_create_without_retry_fails() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    cluster.service.lose_connection_after_creates(1);
    let err = a.lock().unwrap_err();

    assert!(matches!(err, LockError::Session(_)));
    assert_eq!(a.state(), LockState::Idle);
    assert!(a.node_path().is_none());
    // The node the lost response would have named was found and removed.
    assert!(cluster.queue(ROOT).is_empty());
}

#[test]
fn test_interrupted_create_does_not_block_session_peers() {
    let cluster = TestCluster::new();
    let session = cluster.session();
    let mut a = LockHandle::new(Arc::clone(&session), "orders");
    let mut b = LockHandle::new(session, "orders");

    cluster.service.lose_connection_after_creates(1);
    assert!(matches!(a.lock(), Err(LockError::Session(_))));

    assert!(b.try_lock().unwrap());
    assert_eq!(cluster.queue(ROOT).len(), 1);
    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::NotHeld);
}

#[test]
fn test_create_during_outage_is_swept_on_unlock() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    cluster.service.set_available(false);
    assert!(matches!(a.lock(), Err(LockError::Session(_))));
    // The sweep cannot run while the service is down.
    assert!(a.unlock().is_err());
    cluster.service.set_available(true);

    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::NotHeld);
    assert!(cluster.queue(ROOT).is_empty());
}

#[test]
#[serial]
fn test_waiter_keeps_node_when_connection_drops() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();
    let a_node = a.node_path().unwrap().to_string();

    let mut b = cluster.handle("orders");
    let waiter = thread::spawn(move || {
        let result = b.lock();
        (b, result)
    });
    assert!(wait_until(PATIENCE, || cluster.service.watch_count(&a_node) == 1));

    // A's node disappears while B cannot reach the service.
    cluster.service.set_available(false);
    cluster.service.delete_node(&a_node).unwrap();

    let (mut b, result) = waiter.join().unwrap();
    assert!(matches!(result, Err(LockError::Session(_))));
    assert_eq!(b.state(), LockState::Interrupted);
    let kept = b.node_path().unwrap().to_string();
    assert!(cluster.service.contains(&kept));

    cluster.service.set_available(true);
    b.lock().unwrap();
    assert_eq!(b.node_path(), Some(kept.as_str()));
    assert_eq!(b.unlock().unwrap(), ReleaseOutcome::Released);
    drop(a);
    assert!(cluster.queue(ROOT).is_empty());
}

#[test]
#[serial]
fn test_unlock_withdraws_interrupted_request() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();
    let a_node = a.node_path().unwrap().to_string();

    let mut b = cluster.handle("orders");
    let waiter = thread::spawn(move || {
        let result = b.lock();
        (b, result)
    });
    assert!(wait_until(PATIENCE, || cluster.service.watch_count(&a_node) == 1));

    cluster.service.set_available(false);
    cluster.service.delete_node(&a_node).unwrap();

    let (mut b, result) = waiter.join().unwrap();
    assert!(result.is_err());
    assert_eq!(b.state(), LockState::Interrupted);

    cluster.service.set_available(true);
    assert_eq!(b.unlock().unwrap(), ReleaseOutcome::Withdrawn);
    assert!(cluster.queue(ROOT).is_empty());

    let mut c = cluster.handle("orders");
    assert!(c.try_lock().unwrap());
}

#[test]
#[serial]
fn test_timed_out_waiter_drops_its_watch() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();
    let a_node = a.node_path().unwrap().to_string();

    let mut b = cluster.handle_with("orders", remain_queued());
    for _ in 0..3 {
        assert!(!b.try_lock_for(Duration::from_millis(10)).unwrap());
    }

    assert_eq!(cluster.service.watch_count(&a_node), 0);
    assert_eq!(cluster.queue(ROOT).len(), 2);
}

#[test]
fn test_guard_releases_on_drop() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    {
        let guard = a.acquire().unwrap();
        assert_eq!(guard.lock_name(), "orders");
        assert!(guard.node_path().is_some());
        assert_eq!(cluster.queue(ROOT).len(), 1);
    }

    assert!(cluster.queue(ROOT).is_empty());
    assert_eq!(a.state(), LockState::Released);
}

#[test]
fn test_guard_manual_release() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");

    let guard = a.acquire().unwrap();
    assert_eq!(guard.release().unwrap(), ReleaseOutcome::Released);
    assert!(cluster.queue(ROOT).is_empty());
}

#[test]
#[serial]
fn test_acquire_for_returns_none_on_timeout() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    let _held = a.acquire().unwrap();

    let mut b = cluster.handle("orders");
    assert!(b.acquire_for(Duration::from_millis(20)).unwrap().is_none());
    assert_eq!(cluster.queue(ROOT).len(), 1);
}

#[test]
#[serial]
fn test_dropping_queued_handle_withdraws() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();

    let mut b = cluster.handle_with("orders", remain_queued());
    assert!(!b.try_lock_for(Duration::from_millis(10)).unwrap());
    assert_eq!(cluster.queue(ROOT).len(), 2);

    drop(b);
    assert_eq!(cluster.queue(ROOT).len(), 1);
}

#[test]
#[serial]
fn test_participant_listing_shows_queue_with_metadata() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle_with(
        "orders",
        LockOptions {
            purpose: "nightly report".to_string(),
            ..LockOptions::default()
        },
    );
    a.lock().unwrap();
    let mut b = cluster.handle_with("orders", remain_queued());
    assert!(!b.try_lock_for(Duration::from_millis(10)).unwrap());

    let participants = a.participant_nodes().unwrap();

    assert_eq!(participants.len(), 2);
    assert!(participants[0].is_holder());
    assert_eq!(participants[0].path, a.node_path().unwrap());
    let meta = participants[0].metadata.as_ref().unwrap();
    assert_eq!(meta.purpose, "nightly report");
    assert_eq!(participants[1].position, 1);
    assert_eq!(participants[1].path, b.node_path().unwrap());
    assert!(participants[0].sequence < participants[1].sequence);
    assert!(participants[0].to_string().contains("holder"));
}

#[test]
fn test_queue_of_unused_lock_is_empty() {
    let cluster = TestCluster::new();
    let session = cluster.session();

    let participants = queue(&session, &LockOptions::default(), "never-used").unwrap();

    assert!(participants.is_empty());
    assert!(!cluster.service.contains("/locks/never-used"));
}

#[test]
fn test_closing_session_releases_lock() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    let mut b = cluster.handle("orders");
    a.lock().unwrap();

    a.session().close().unwrap();

    assert!(cluster.queue(ROOT).is_empty());
    assert_eq!(a.unlock().unwrap(), ReleaseOutcome::AlreadyLost);
    assert!(b.try_lock().unwrap());
}

#[test]
#[serial]
fn test_waiter_session_closed_while_waiting() {
    let cluster = TestCluster::new();
    let mut a = cluster.handle("orders");
    a.lock().unwrap();
    let a_node = a.node_path().unwrap().to_string();

    let session_b = cluster.session();
    let mut b = LockHandle::new(Arc::clone(&session_b), "orders");
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let waiter = thread::spawn(move || {
        let result = b.lock();
        *slot.lock().unwrap() = Some(result);
        b
    });
    assert!(wait_until(PATIENCE, || cluster.service.watch_count(&a_node) == 1));

    session_b.close().unwrap();

    let b = waiter.join().unwrap();
    let result = outcome.lock().unwrap().take().unwrap();
    assert!(matches!(result, Err(LockError::Session(_))));
    assert_eq!(b.state(), LockState::Idle);
    assert!(b.node_path().is_none());
    assert!(a.is_held());
    assert_eq!(cluster.queue(ROOT).len(), 1);
}
