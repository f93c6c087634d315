//! # Agent
//!
//! Single-value identity processing a serialized queue of value-transforming
//! jobs. Submissions append to a FIFO queue guarded by the monitor; jobs run
//! strictly one at a time on their assigned executor, each fed the current
//! value and replacing it with its result. User code (actions, validators,
//! error handlers) always runs outside the monitor's exclusive section;
//! only the bookkeeping around it holds the lock.
//!
//! Ordering: because only one job may be in flight per agent and the next
//! front job is posted only after the current one fully finishes (including
//! error handling), side effects on the current value are totally ordered
//! even when jobs land on different executors.

use crate::error::{panic_message, AgentError, Result};
use crate::executor::{cpu_pool, io_pool, Executor, Immediate};
use crate::latch::CountDownLatch;
use crate::monitor::Monitor;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Cause reported by a failing action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Action<T> = Box<dyn FnOnce(&Agent<T>, &T) -> std::result::Result<T, ActionError> + Send>;
type Validator<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type ErrorHandler<T> = Box<dyn Fn(&Agent<T>, &AgentError) + Send + Sync>;
type ReadTransform<T> = Box<dyn Fn(&T) -> T + Send + Sync>;

/// Policy governing whether a job failure halts future processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    /// A failing job reports to the error handler and the queue keeps
    /// advancing.
    Continue,
    /// The first failing job latches its error; no further job starts and
    /// submissions are rejected until [`Agent::restart`].
    Fail,
}

/// Options for [`Agent::restart`].
#[derive(Debug, Clone, Default)]
pub struct RestartOpts {
    /// Discard the entire pending queue instead of resuming it.
    pub clear_actions: bool,
    /// Replace the failure policy installed at construction.
    pub error_mode: Option<ErrorMode>,
}

enum JobKind<T> {
    /// Value-transforming action; taken out of its slot exactly once, when
    /// the job reaches the front and starts executing.
    Action(Option<Action<T>>),
    /// Zero-op synchronization point injected by `await_done`.
    Sync(Arc<CountDownLatch>),
}

/// One deferred unit of work bound to an agent: the action, its target
/// executor, and the identity of the submitting thread (used only to
/// position await synchronization jobs).
struct Job<T> {
    kind: JobKind<T>,
    executor: Arc<dyn Executor>,
    submitter: ThreadId,
}

struct AgentState<T> {
    current: Arc<T>,
    queue: VecDeque<Job<T>>,
    /// One job posted but not yet finished. The front job stays queued
    /// while it runs so awaiters can still position themselves behind it.
    in_flight: bool,
    mode: ErrorMode,
    error: Option<AgentError>,
}

/// Counters tracking an agent's job processing.
#[derive(Debug, Default)]
pub struct AgentStats {
    /// Actions that ran to completion, successfully or not
    pub jobs_executed: AtomicUsize,
    /// Actions that returned an error or panicked
    pub failures: AtomicUsize,
    /// Computed values discarded by the validator
    pub validation_rejections: AtomicUsize,
}

struct AgentShared<T> {
    state: Monitor<AgentState<T>>,
    validator: Option<Validator<T>>,
    error_handler: Option<ErrorHandler<T>>,
    copy_on_read: Option<ReadTransform<T>>,
    stats: AgentStats,
}

/// Single-value identity with a serialized job queue. Cloning yields
/// another handle to the same agent.
pub struct Agent<T> {
    shared: Arc<AgentShared<T>>,
}

impl<T> Clone for Agent<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

/// Builder for [`Agent`] configuration.
pub struct AgentBuilder<T> {
    initial: T,
    mode: ErrorMode,
    validator: Option<Validator<T>>,
    error_handler: Option<ErrorHandler<T>>,
    copy_on_read: Option<ReadTransform<T>>,
}

impl<T: Send + Sync + 'static> AgentBuilder<T> {
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            mode: ErrorMode::Continue,
            validator: None,
            error_handler: None,
            copy_on_read: None,
        }
    }

    /// Failure policy; defaults to [`ErrorMode::Continue`].
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Predicate every computed value must pass before it becomes current.
    /// A rejected value is silently discarded; it is neither a success nor
    /// an error.
    pub fn validator(mut self, validator: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Callback invoked once per failing job, in every error mode.
    pub fn error_handler(
        mut self,
        handler: impl Fn(&Agent<T>, &AgentError) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Read-side transform applied by [`Agent::value`], e.g. a deep copy
    /// for callers that must not alias the committed value.
    pub fn copy_on_read(mut self, transform: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.copy_on_read = Some(Box::new(transform));
        self
    }

    pub fn build(self) -> Agent<T> {
        Agent {
            shared: Arc::new(AgentShared {
                state: Monitor::new(AgentState {
                    current: Arc::new(self.initial),
                    queue: VecDeque::new(),
                    in_flight: false,
                    mode: self.mode,
                    error: None,
                }),
                validator: self.validator,
                error_handler: self.error_handler,
                copy_on_read: self.copy_on_read,
                stats: AgentStats::default(),
            }),
        }
    }
}

impl<T: Send + Sync + 'static> Agent<T> {
    /// Agent with default configuration: continue mode, no validator.
    pub fn new(initial: T) -> Self {
        AgentBuilder::new(initial).build()
    }

    pub fn builder(initial: T) -> AgentBuilder<T> {
        AgentBuilder::new(initial)
    }

    /// Latest accepted value. Never blocks on pending jobs; reflects the
    /// most recently committed state.
    pub fn value(&self) -> Arc<T> {
        let current = self.shared.state.enter(|s| Arc::clone(&s.current));
        match &self.shared.copy_on_read {
            Some(transform) => Arc::new(transform(&current)),
            None => current,
        }
    }

    /// The latched error, if the agent is stopped.
    pub fn error(&self) -> Option<AgentError> {
        self.shared.state.enter(|s| s.error.clone())
    }

    /// Whether a failure latched in fail mode is still unresolved.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.enter(|s| s.error.is_some())
    }

    /// Number of queued jobs, including one in flight.
    pub fn queue_len(&self) -> usize {
        self.shared.state.enter(|s| s.queue.len())
    }

    pub fn stats(&self) -> &AgentStats {
        &self.shared.stats
    }

    /// Enqueue `action` on the shared CPU pool. Returns false if the agent
    /// is stopped. Never blocks, regardless of queue depth.
    pub fn send<F>(&self, action: F) -> bool
    where
        F: FnOnce(&Agent<T>, &T) -> std::result::Result<T, ActionError> + Send + 'static,
    {
        self.send_via(cpu_pool(), action)
    }

    /// Rejecting variant of [`Agent::send`].
    pub fn try_send<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(&Agent<T>, &T) -> std::result::Result<T, ActionError> + Send + 'static,
    {
        if self.send(action) {
            Ok(())
        } else {
            Err(AgentError::Stopped.into())
        }
    }

    /// Enqueue `action` on the shared I/O pool. Same acceptance semantics
    /// as [`Agent::send`].
    pub fn send_off<F>(&self, action: F) -> bool
    where
        F: FnOnce(&Agent<T>, &T) -> std::result::Result<T, ActionError> + Send + 'static,
    {
        self.send_via(io_pool(), action)
    }

    /// Enqueue `action` on a caller-supplied executor.
    pub fn send_via<F>(&self, executor: Arc<dyn Executor>, action: F) -> bool
    where
        F: FnOnce(&Agent<T>, &T) -> std::result::Result<T, ActionError> + Send + 'static,
    {
        self.push_job(Job {
            kind: JobKind::Action(Some(Box::new(action))),
            executor,
            submitter: thread::current().id(),
        })
    }

    /// Block until every job this thread had already submitted has finished
    /// executing, not merely been queued. Returns immediately if none are
    /// queued. On timeout the injected synchronization job is not
    /// cancelled; it still runs in the background.
    ///
    /// The synchronization job is inserted directly after this thread's
    /// last queued job, never reordering jobs from other threads. On a
    /// stopped agent it runs only once a successful restart resumes the
    /// queue.
    pub fn await_done(&self, timeout: Option<Duration>) -> bool {
        let me = thread::current().id();
        let latch = Arc::new(CountDownLatch::new(1));
        let injected = self.shared.state.enter(|s| {
            match s.queue.iter().rposition(|job| job.submitter == me) {
                Some(pos) => {
                    s.queue.insert(
                        pos + 1,
                        Job {
                            kind: JobKind::Sync(Arc::clone(&latch)),
                            executor: Arc::new(Immediate),
                            submitter: me,
                        },
                    );
                    true
                }
                None => false,
            }
        });
        if !injected {
            return true;
        }
        latch.wait(timeout)
    }

    /// Drain this thread's submissions across several agents under one
    /// shared deadline.
    pub fn await_all(agents: &[&Agent<T>], timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        for agent in agents {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !agent.await_done(remaining) {
                return false;
            }
        }
        true
    }

    /// Clear a latched error and install `new_value` as current.
    ///
    /// Fails with [`AgentError::IllegalRestart`] unless the agent is
    /// stopped, and with [`AgentError::InvalidValue`] if the replacement
    /// does not pass the validator; state is unchanged in either case.
    /// With `clear_actions` the pending queue is discarded (synchronization
    /// jobs in it are released so awaiters unblock); otherwise processing
    /// resumes from the front of the remaining queue.
    pub fn restart(&self, new_value: T, opts: RestartOpts) -> Result<()> {
        if let Some(validator) = &self.shared.validator {
            if !validator(&new_value) {
                return Err(AgentError::InvalidValue.into());
            }
        }
        let next = self.shared.state.enter(|s| {
            if s.error.is_none() {
                return Err(AgentError::IllegalRestart);
            }
            s.error = None;
            s.current = Arc::new(new_value);
            if let Some(mode) = opts.error_mode {
                s.mode = mode;
            }
            if opts.clear_actions {
                for job in s.queue.drain(..) {
                    if let JobKind::Sync(latch) = job.kind {
                        latch.count_down();
                    }
                }
            }
            // Resume the pump if jobs survived.
            Ok(match s.queue.front() {
                Some(job) if !s.in_flight => {
                    let executor = Arc::clone(&job.executor);
                    s.in_flight = true;
                    Some(executor)
                }
                _ => None,
            })
        })?;
        if let Some(executor) = next {
            self.post_pump(executor);
        }
        Ok(())
    }

    fn push_job(&self, job: Job<T>) -> bool {
        enum Push {
            Rejected,
            Queued,
            Pump(Arc<dyn Executor>),
        }

        let outcome = self.shared.state.enter(|s| {
            if s.error.is_some() {
                return Push::Rejected;
            }
            s.queue.push_back(job);
            if !s.in_flight {
                if let Some(front) = s.queue.front() {
                    let executor = Arc::clone(&front.executor);
                    s.in_flight = true;
                    return Push::Pump(executor);
                }
            }
            Push::Queued
        });

        match outcome {
            Push::Rejected => false,
            Push::Queued => true,
            Push::Pump(executor) => {
                self.post_pump(executor);
                true
            }
        }
    }

    fn post_pump(&self, executor: Arc<dyn Executor>) {
        let shared = Arc::clone(&self.shared);
        executor.post(Box::new(move || run_front_job(shared)));
    }
}

/// Runs once per job, on the job's assigned executor: snapshot the current
/// value under the monitor, run the action outside it, commit the outcome,
/// then post the new front job.
fn run_front_job<T: Send + Sync + 'static>(shared: Arc<AgentShared<T>>) {
    enum Step<T> {
        Action(Action<T>, Arc<T>),
        Sync(Arc<CountDownLatch>),
        Idle,
    }

    let step = shared.state.enter(|s| {
        let current = Arc::clone(&s.current);
        match s.queue.front_mut() {
            Some(job) => match &mut job.kind {
                JobKind::Action(slot) => match slot.take() {
                    Some(action) => Step::Action(action, current),
                    None => Step::Idle,
                },
                JobKind::Sync(latch) => Step::Sync(Arc::clone(latch)),
            },
            None => Step::Idle,
        }
    });

    enum Outcome<T> {
        Commit(T),
        /// Sync job or validator rejection: value unchanged.
        Keep,
        Fail(AgentError),
    }

    let outcome = match step {
        Step::Idle => return,
        Step::Sync(latch) => {
            latch.count_down();
            Outcome::Keep
        }
        Step::Action(action, current) => {
            let agent = Agent { shared: Arc::clone(&shared) };
            match catch_unwind(AssertUnwindSafe(|| action(&agent, &current))) {
                Ok(Ok(value)) => {
                    shared.stats.jobs_executed.fetch_add(1, Ordering::Relaxed);
                    if shared.validator.as_ref().map_or(true, |accept| accept(&value)) {
                        Outcome::Commit(value)
                    } else {
                        shared.stats.validation_rejections.fetch_add(1, Ordering::Relaxed);
                        Outcome::Keep
                    }
                }
                Ok(Err(cause)) => Outcome::Fail(AgentError::ActionFailed { message: cause.to_string() }),
                Err(payload) => Outcome::Fail(AgentError::ActionFailed { message: panic_message(payload) }),
            }
        }
    };

    // A failure reaches the handler exactly once, outside the lock, before
    // the queue advances; the failed job is still front so no other job can
    // start underneath the handler.
    if let Outcome::Fail(error) = &outcome {
        shared.stats.jobs_executed.fetch_add(1, Ordering::Relaxed);
        shared.stats.failures.fetch_add(1, Ordering::Relaxed);
        if let Some(handler) = &shared.error_handler {
            let agent = Agent { shared: Arc::clone(&shared) };
            handler(&agent, error);
        }
    }

    let next = shared.state.enter(|s| {
        match outcome {
            Outcome::Commit(value) => s.current = Arc::new(value),
            Outcome::Keep => {}
            Outcome::Fail(error) => {
                if s.mode == ErrorMode::Fail && s.error.is_none() {
                    s.error = Some(error);
                }
            }
        }
        s.queue.pop_front();
        match s.queue.front() {
            Some(job) if s.error.is_none() => Some(Arc::clone(&job.executor)),
            _ => {
                s.in_flight = false;
                None
            }
        }
    });

    if let Some(executor) = next {
        let shared = Arc::clone(&shared);
        executor.post(Box::new(move || run_front_job(shared)));
    }
}
