//! # Concurrency Stress Tests
//!
//! Hammers one agent from many threads and checks the two core guarantees:
//! at most one job mid-execution at any instant, and per-thread FIFO of
//! submissions.

use sequin::{ActionError, Agent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_single_flight_under_concurrent_submission() {
    let agent = Agent::new(0usize);
    let active = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for t in 0..8 {
        let agent = agent.clone();
        let active = Arc::clone(&active);
        let overlapped = Arc::clone(&overlapped);
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                let active = Arc::clone(&active);
                let overlapped = Arc::clone(&overlapped);
                let job = move |_: &Agent<usize>, v: &usize| -> Result<usize, ActionError> {
                    if active.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    let next = v + 1;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(next)
                };
                // Mix both shared pools; ordering must hold regardless of
                // which executor runs each job.
                let accepted = if t % 2 == 0 { agent.send(job) } else { agent.send_off(job) };
                assert!(accepted);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("submitter thread panicked");
    }

    // All submitters are done, so one more job from this thread lands
    // behind everything already queued; awaiting it drains the agent.
    assert!(agent.send(|_, v| Ok(*v)));
    assert!(agent.await_done(Some(Duration::from_secs(10))), "agent failed to drain");

    assert!(!overlapped.load(Ordering::SeqCst), "two jobs were mid-execution at once");
    assert_eq!(*agent.value(), 200);
}

#[test]
fn test_per_thread_submission_order_is_preserved() {
    let agent = Agent::new(Vec::<(usize, usize)>::new());

    let mut handles = Vec::new();
    for t in 0..4 {
        let agent = agent.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                assert!(agent.send(move |_, v| {
                    let mut next = v.clone();
                    next.push((t, i));
                    Ok(next)
                }));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("submitter thread panicked");
    }

    assert!(agent.send(|_, v| Ok(v.clone())));
    assert!(agent.await_done(Some(Duration::from_secs(10))), "agent failed to drain");

    let log = agent.value();
    assert_eq!(log.len(), 200);
    for t in 0..4 {
        let sequence: Vec<usize> = log.iter().filter(|(tt, _)| *tt == t).map(|(_, i)| *i).collect();
        assert_eq!(
            sequence,
            (0..50).collect::<Vec<_>>(),
            "thread {} submissions were reordered",
            t
        );
    }
}
