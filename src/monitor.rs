//! # Monitor Primitive
//!
//! Mutual exclusion plus a condition variable guarding a state value, with
//! spurious-wakeup-safe waiting. This is the minimal synchronization
//! building block the rest of the crate is built from; no component above
//! it assumes any stronger primitive.
//!
//! Waiting and signalling happen through a [`Section`], which can only be
//! obtained inside [`Monitor::enter`], so waiting outside an exclusive
//! section is unrepresentable rather than a runtime error.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Mutual exclusion plus a condition variable guarding a state value `S`.
///
/// Re-entering the same monitor from inside `enter` is undefined; callers
/// must not nest incompatible synchronized sections.
pub struct Monitor<S> {
    state: Mutex<S>,
    cond: Condvar,
}

/// Exclusive access to a monitor's state. Dereferences to `S`.
pub struct Section<'a, S> {
    guard: MutexGuard<'a, S>,
    cond: &'a Condvar,
}

impl<S> Monitor<S> {
    pub fn new(state: S) -> Self {
        Self { state: Mutex::new(state), cond: Condvar::new() }
    }

    /// Run `body` with exclusive access to the guarded state.
    pub fn enter<R>(&self, body: impl FnOnce(&mut Section<'_, S>) -> R) -> R {
        let mut section = Section { guard: self.state.lock(), cond: &self.cond };
        body(&mut section)
    }
}

impl<S> Section<'_, S> {
    /// Block until woken **and** `predicate` holds, or until `timeout`
    /// elapses. Exclusivity is released while blocked and re-acquired
    /// before returning; spurious wakeups re-check the predicate and go
    /// back to sleep. `None` waits indefinitely.
    ///
    /// Returns whether the predicate was satisfied.
    pub fn wait_until(
        &mut self,
        timeout: Option<Duration>,
        mut predicate: impl FnMut(&S) -> bool,
    ) -> bool {
        // The deadline is fixed once so repeated wakeups cannot extend it.
        let deadline = timeout.map(|t| Instant::now() + t);
        while !predicate(&self.guard) {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut self.guard, deadline).timed_out() {
                        return predicate(&self.guard);
                    }
                }
                None => self.cond.wait(&mut self.guard),
            }
        }
        true
    }

    /// Block until woken by any signal or until `timeout` elapses.
    /// Returns false on timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => !self.cond.wait_for(&mut self.guard, timeout).timed_out(),
            None => {
                self.cond.wait(&mut self.guard);
                true
            }
        }
    }

    /// Wake one thread blocked in `wait`/`wait_until` on this monitor.
    /// No-op if none are waiting.
    pub fn signal(&self) {
        self.cond.notify_one();
    }

    /// Wake all threads blocked in `wait`/`wait_until` on this monitor.
    pub fn broadcast(&self) {
        self.cond.notify_all();
    }
}

impl<S> Deref for Section<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<S> DerefMut for Section<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}
