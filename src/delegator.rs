//! # Async Delegator
//!
//! Wraps a host object with two companion proxies that route registered
//! method calls through one dedicated background worker: the fire-and-forget
//! proxy returns a pending result cell immediately, the blocking proxy
//! returns once its call has run. Both share the worker, so every call
//! against one host executes strictly in the order it was posted, whichever
//! proxy or thread issued it.
//!
//! Hosts declare their callable surface in a [`MethodTable`] (a name, a
//! declared [`Arity`], and a closure over `&mut T`), so unknown names and
//! argument-count mismatches are reported to the caller before anything is
//! scheduled. Touching the host outside the proxies voids the ordering and
//! thread-safety guarantees; that obligation stays with the caller.

use crate::error::{panic_message, DispatchError};
use crate::executor::{Executor, SingleWorker};
use crate::ivar::IVar;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Boxed argument or return value for a delegated call. Results are shared
/// through the result cell, so the payload must be `Sync` as well as `Send`.
pub type CallArg = Box<dyn Any + Send + Sync>;
/// Cause reported by a failing method body.
pub type CallError = Box<dyn std::error::Error + Send + Sync + 'static>;
/// Outcome of a registered method body.
pub type CallResult = std::result::Result<CallArg, CallError>;

type MethodFn<T> = Arc<dyn Fn(&mut T, Vec<CallArg>) -> CallResult + Send + Sync>;

/// Declared parameter count a registered method accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Between(lo, hi) => count >= lo && count <= hi,
        }
    }

    fn expected(&self) -> String {
        match *self {
            Arity::Exact(n) => format!("exactly {}", n),
            Arity::AtLeast(n) => format!("at least {}", n),
            Arity::Between(lo, hi) => format!("between {} and {}", lo, hi),
        }
    }
}

struct MethodEntry<T> {
    arity: Arity,
    body: MethodFn<T>,
}

/// Registry of a host's callable surface.
pub struct MethodTable<T> {
    methods: HashMap<String, MethodEntry<T>>,
}

impl<T> MethodTable<T> {
    pub fn new() -> Self {
        Self { methods: HashMap::new() }
    }

    /// Register `name` with its declared arity and body.
    pub fn method<F>(mut self, name: &str, arity: Arity, body: F) -> Self
    where
        F: Fn(&mut T, Vec<CallArg>) -> CallResult + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), MethodEntry { arity, body: Arc::new(body) });
        self
    }

    fn entry(&self, name: &str) -> Option<&MethodEntry<T>> {
        self.methods.get(name)
    }
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct HostShared<T> {
    /// The delegate. Only the worker touches it after construction.
    target: Mutex<T>,
    table: MethodTable<T>,
    worker: SingleWorker,
    /// Method names that already passed validation once.
    validated: Mutex<HashSet<String>>,
}

/// Companion proxy pair wrapping a host value.
///
/// The worker and both proxies are constructed eagerly, alongside the
/// host, so the synchronization state exists before any concurrent access
/// is possible. Lifetime equals the host's: dropping the last handle joins
/// the worker.
pub struct AsyncHost<T> {
    cast: Delegator<T>,
    call: Delegator<T>,
}

impl<T: Send + 'static> AsyncHost<T> {
    pub fn new(target: T, table: MethodTable<T>) -> Self {
        let shared = Arc::new(HostShared {
            target: Mutex::new(target),
            table,
            worker: SingleWorker::new("sequin-async"),
            validated: Mutex::new(HashSet::new()),
        });
        Self {
            cast: Delegator { shared: Arc::clone(&shared), blocking: false },
            call: Delegator { shared, blocking: true },
        }
    }

    /// Fire-and-forget proxy: `invoke` returns a pending result cell.
    pub fn cast(&self) -> &Delegator<T> {
        &self.cast
    }

    /// Blocking proxy: `invoke` returns once the call has run, with the
    /// result cell already terminal.
    pub fn call(&self) -> &Delegator<T> {
        &self.call
    }
}

/// Proxy routing method calls onto the host's dedicated worker.
pub struct Delegator<T> {
    shared: Arc<HostShared<T>>,
    blocking: bool,
}

impl<T> Clone for Delegator<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), blocking: self.blocking }
    }
}

impl<T: Send + 'static> Delegator<T> {
    /// Validate `method` against the host's table and post the call.
    ///
    /// Unknown names and argument counts outside the declared arity are
    /// reported here, before anything is scheduled. A name that validated
    /// once skips the arity re-check on later calls; a mismatched count is
    /// then the registered body's to report, through the result cell.
    ///
    /// A failure inside the method body is captured into the returned cell
    /// and never reaches the worker thread; it keeps processing queued
    /// calls.
    pub fn invoke(
        &self,
        method: &str,
        args: Vec<CallArg>,
    ) -> std::result::Result<IVar<CallArg>, DispatchError> {
        let entry = self
            .shared
            .table
            .entry(method)
            .ok_or_else(|| DispatchError::UnknownMethod { method: method.to_string() })?;
        if !self.shared.validated.lock().contains(method) {
            if !entry.arity.accepts(args.len()) {
                return Err(DispatchError::InvalidArity {
                    method: method.to_string(),
                    expected: entry.arity.expected(),
                    actual: args.len(),
                });
            }
            self.shared.validated.lock().insert(method.to_string());
        }

        let result = IVar::new();
        let cell = result.clone();
        let body = Arc::clone(&entry.body);
        let shared = Arc::clone(&self.shared);
        self.shared.worker.post(Box::new(move || {
            let outcome = {
                let mut target = shared.target.lock();
                catch_unwind(AssertUnwindSafe(|| body.as_ref()(&mut *target, args)))
            };
            match outcome {
                Ok(Ok(value)) => {
                    cell.set(value);
                }
                Ok(Err(cause)) => {
                    cell.fail(cause);
                }
                Err(payload) => {
                    cell.fail(panic_message(payload));
                }
            }
        }));

        if self.blocking {
            result.wait(None);
        }
        Ok(result)
    }
}
