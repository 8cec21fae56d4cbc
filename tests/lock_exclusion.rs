mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::*;
use omws::dag::Scheduler;
use omws::errors::OmwsError;
use omws::fs::mock::MockFileSystem;
use omws::lock::with_experiment_lock;
use omws::store::{TicketStore, progress};
use omws::ticket::Ticket;
use omws::types::JobType;

/// Run `threads` critical sections on the same lock and return the highest
/// number of holders ever observed at once.
fn max_concurrent_holders(store: &TicketStore, ticket: &Ticket, threads: usize) -> usize {
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (store, ticket) = (store.clone(), ticket.clone());
            let (inside, peak, barrier) = (inside.clone(), peak.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                with_experiment_lock(&store, &ticket, || {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    peak.load(Ordering::SeqCst)
}

#[test]
fn test_flock_excludes_threads() {
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());
    assert_eq!(max_concurrent_holders(&store, &sub.ticket, 6), 1);
}

#[test]
fn test_mock_lock_excludes_threads() {
    let store = TicketStore::new("/tickets", Arc::new(MockFileSystem::new()));
    let sub = submit_plan(&store, chain_plan());
    assert_eq!(max_concurrent_holders(&store, &sub.ticket, 6), 1);
}

#[test]
fn test_lock_released_on_error() {
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());

    let err = with_experiment_lock(&store, &sub.ticket, || -> omws::errors::Result<()> {
        Err(OmwsError::NoResults)
    })
    .unwrap_err();
    assert!(matches!(err, OmwsError::NoResults));

    // Would block forever if the lock had leaked.
    let value = with_experiment_lock(&store, &sub.ticket, || Ok(7)).unwrap();
    assert_eq!(value, 7);
}

#[test]
fn test_lock_on_missing_ticket_is_unknown_ticket() {
    let (_dir, store) = scratch_store();
    let ghost = Ticket::parse("Gh0st1").unwrap();
    let err = with_experiment_lock(&store, &ghost, || Ok(())).unwrap_err();
    assert!(matches!(err, OmwsError::UnknownTicket(_)));
}

#[test]
fn test_concurrent_leaf_completions_finish_experiment_once() {
    init_tracing();
    for _ in 0..10 {
        let (_dir, store) = scratch_store();
        // Two independent leaves.
        let plan = PlanBuilder::new()
            .job("L", JobType::Model)
            .job("R", JobType::Test);
        let sub = submit_plan(&store, plan);
        let (l, r) = (member(&sub, "L"), member(&sub, "R"));
        let exec = FakeExecutor::new(store.clone());
        for (t, ty) in [(&l, JobType::Model), (&r, JobType::Test)] {
            assert!(exec.take(t, ty).unwrap());
            exec.finish(t, ty).unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [l, r]
            .into_iter()
            .map(|t| {
                let scheduler = Scheduler::new(store.clone());
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    scheduler.on_job_completed(&t).unwrap()
                })
            })
            .collect();
        let steps: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(steps.iter().filter(|s| s.experiment_finished).count(), 1);
        assert_eq!(steps.iter().filter(|s| s.already_done).count(), 1);
        assert_eq!(store.read_progress(&sub.ticket).unwrap(), progress::COMPLETE);
        let log = store.read_log(&sub.ticket).unwrap();
        assert_eq!(log.matches("Experiment finished").count(), 1);
    }
}
