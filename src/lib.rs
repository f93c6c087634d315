//! # Sequin
//!
//! A small concurrency toolkit for sharing ordinary stateful objects across
//! threads without manual locking by calling code:
//!
//! - [`Agent`]: actor-style sequential mailbox serializing value-transforming
//!   jobs against a single current value, with validation, error-mode
//!   policies, await synchronization, and restart-after-failure recovery.
//! - [`AsyncHost`]: per-object proxy pair executing registered method calls
//!   on a dedicated worker, fire-and-forget or blocking, in strict post
//!   order.
//! - [`Monitor`]: mutual exclusion plus spurious-wakeup-safe condition
//!   waiting, the minimal building block under everything else.
//!
//! Supporting pieces: [`Executor`] implementations (shared CPU and I/O
//! pools, a dedicated single worker, an inline fallback), the [`IVar`]
//! result cell, and a [`CountDownLatch`].
//!
//! ## Example
//!
//! ```no_run
//! use sequin::Agent;
//!
//! let agent = Agent::new(0i64);
//! agent.send(|_, v| Ok(v + 1));
//! agent.send(|_, v| Ok(v * 10));
//! agent.await_done(None);
//! assert_eq!(*agent.value(), 10);
//! ```

pub mod agent;
pub mod delegator;
pub mod error;
pub mod executor;
pub mod ivar;
pub mod latch;
pub mod monitor;

pub use agent::{ActionError, Agent, AgentBuilder, AgentStats, ErrorMode, RestartOpts};
pub use delegator::{Arity, AsyncHost, CallArg, CallError, CallResult, Delegator, MethodTable};
pub use error::{AgentError, DispatchError, Error, FailureReason, Result};
pub use executor::{
    configure_pools, cpu_pool, io_pool, Executor, ExecutorStats, Immediate, PoolConfig,
    SingleWorker, ThreadPoolExecutor, Work,
};
pub use ivar::IVar;
pub use latch::CountDownLatch;
pub use monitor::{Monitor, Section};
