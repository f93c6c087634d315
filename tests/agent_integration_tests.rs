//! # Agent Integration Tests
//!
//! End-to-end coverage of the agent's ordering, failure-policy, await, and
//! restart behavior.

use pretty_assertions::assert_eq;
use sequin::{
    Agent, AgentError, CountDownLatch, Error, ErrorMode, RestartOpts, ThreadPoolExecutor,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DRAIN: Option<Duration> = Some(Duration::from_secs(5));

/// Poll until the latched error is visible; the error handler runs just
/// before the stop is committed.
fn wait_until_stopped<T: Send + Sync + 'static>(agent: &Agent<T>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !agent.is_stopped() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert!(agent.is_stopped(), "agent never latched the failure");
}

#[test]
fn test_fifo_left_fold_matches_sequential_application() {
    let agent = Agent::new(Vec::<usize>::new());
    for i in 0..100 {
        assert!(agent.send(move |_, v| {
            let mut next = v.clone();
            next.push(i);
            Ok(next)
        }));
    }
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_send_via_custom_executor_drives_value() {
    let pool = Arc::new(ThreadPoolExecutor::new("agent-via", 2));
    let agent = Agent::new(0i64);
    assert!(agent.send_via(pool, |_, _| Ok(10)));
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), 10);
}

#[test]
fn test_fail_mode_latches_and_restart_recovers() {
    let failed = Arc::new(CountDownLatch::new(1));
    let on_failure = Arc::clone(&failed);
    let agent = Agent::builder(0i64)
        .error_mode(ErrorMode::Fail)
        .error_handler(move |_, _| on_failure.count_down())
        .build();

    assert!(agent.send(|_, _| Err("worker exploded".into())));
    assert!(failed.wait(DRAIN), "error handler never ran");
    wait_until_stopped(&agent);

    assert_eq!(*agent.value(), 0, "failed action must not change the value");
    assert!(!agent.send(|_, v| Ok(v + 1)), "stopped agent must reject submissions");
    assert!(matches!(agent.error(), Some(AgentError::ActionFailed { .. })));

    agent.restart(5, RestartOpts::default()).expect("restart on a stopped agent");
    assert!(!agent.is_stopped());
    assert_eq!(*agent.value(), 5);

    assert!(agent.send(|_, v| Ok(v + 1)));
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), 6);
}

#[test]
fn test_continue_mode_keeps_processing_after_failure() {
    let agent = Agent::builder(0i64).error_mode(ErrorMode::Continue).build();
    assert!(agent.send(|_, _| Err("transient".into())));
    assert!(agent.send(|_, v| Ok(v + 3)));
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), 3);
    assert!(!agent.is_stopped(), "continue mode must not latch");
    assert_eq!(agent.stats().failures.load(Ordering::Relaxed), 1);
}

#[test]
fn test_restart_rejects_invalid_replacement_value() {
    let failed = Arc::new(CountDownLatch::new(1));
    let on_failure = Arc::clone(&failed);
    let agent = Agent::builder(1i64)
        .error_mode(ErrorMode::Fail)
        .validator(|v| *v > 0)
        .error_handler(move |_, _| on_failure.count_down())
        .build();

    assert!(agent.send(|_, _| Err("planned".into())));
    assert!(failed.wait(DRAIN));
    wait_until_stopped(&agent);

    let err = agent.restart(-1, RestartOpts::default()).unwrap_err();
    assert!(matches!(err, Error::Agent(AgentError::InvalidValue)));
    assert!(agent.is_stopped(), "a rejected restart must leave the agent stopped");

    agent.restart(2, RestartOpts::default()).expect("valid replacement");
    assert_eq!(*agent.value(), 2);
}

#[test]
fn test_restart_on_running_agent_is_illegal() {
    let agent = Agent::new(0i64);
    let err = agent.restart(1, RestartOpts::default()).unwrap_err();
    assert!(matches!(err, Error::Agent(AgentError::IllegalRestart)));
    assert_eq!(*agent.value(), 0);
}

#[test]
fn test_restart_resumes_pending_queue() {
    let gate = Arc::new(CountDownLatch::new(1));
    let failed = Arc::new(CountDownLatch::new(1));
    let hold = Arc::clone(&gate);
    let on_failure = Arc::clone(&failed);
    let agent = Agent::builder(0i64)
        .error_mode(ErrorMode::Fail)
        .error_handler(move |_, _| on_failure.count_down())
        .build();

    // The failing job holds the queue open until the follow-ups are in.
    assert!(agent.send(move |_, _| {
        hold.wait(Some(Duration::from_secs(10)));
        Err("planned".into())
    }));
    for i in 1..=3i64 {
        assert!(agent.send(move |_, v| Ok(v + i)));
    }
    gate.count_down();

    assert!(failed.wait(DRAIN));
    wait_until_stopped(&agent);
    assert_eq!(agent.queue_len(), 3, "queued jobs must survive the stop");

    agent.restart(10, RestartOpts::default()).expect("restart resumes the queue");
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), 16);
}

#[test]
fn test_restart_clear_actions_discards_queue_and_releases_waiters() {
    let gate = Arc::new(CountDownLatch::new(1));
    let failed = Arc::new(CountDownLatch::new(1));
    let hold = Arc::clone(&gate);
    let on_failure = Arc::clone(&failed);
    let agent = Agent::builder(0i64)
        .error_mode(ErrorMode::Fail)
        .error_handler(move |_, _| on_failure.count_down())
        .build();

    assert!(agent.send(move |_, _| {
        hold.wait(Some(Duration::from_secs(10)));
        Err("planned".into())
    }));

    // A second thread queues its own job and then awaits it; discarding
    // the queue must unblock that await.
    let submitted = Arc::new(CountDownLatch::new(1));
    let queued = Arc::clone(&submitted);
    let waiter_agent = agent.clone();
    let waiter = thread::spawn(move || {
        assert!(waiter_agent.send(|_, v| Ok(v + 100)));
        queued.count_down();
        waiter_agent.await_done(Some(Duration::from_secs(10)))
    });
    assert!(submitted.wait(DRAIN));

    gate.count_down();
    assert!(failed.wait(DRAIN));
    wait_until_stopped(&agent);

    agent
        .restart(7, RestartOpts { clear_actions: true, error_mode: None })
        .expect("restart with a cleared queue");
    assert_eq!(agent.queue_len(), 0);
    assert_eq!(*agent.value(), 7, "discarded jobs must not touch the value");
    assert!(waiter.join().expect("waiter panicked"), "await must unblock on clear");
}

#[test]
fn test_await_for_times_out_while_job_still_runs() {
    let release = Arc::new(CountDownLatch::new(1));
    let hold = Arc::clone(&release);
    let agent = Agent::new(0i64);
    assert!(agent.send(move |_, v| {
        hold.wait(Some(Duration::from_secs(10)));
        Ok(v + 1)
    }));

    assert!(!agent.await_done(Some(Duration::from_millis(50))), "await should time out");

    // The job was not cancelled; it completes once released.
    release.count_down();
    assert!(agent.await_done(DRAIN));
    assert_eq!(*agent.value(), 1);
}

#[test]
fn test_await_all_drains_several_agents() {
    let a = Agent::new(0i64);
    let b = Agent::new(0i64);
    assert!(a.send(|_, v| Ok(v + 1)));
    assert!(b.send(|_, v| Ok(v + 2)));
    assert!(Agent::await_all(&[&a, &b], DRAIN));
    assert_eq!(*a.value(), 1);
    assert_eq!(*b.value(), 2);
}
