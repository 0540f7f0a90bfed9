//! Effect Scheduling
//!
//! A scheduler decides when and how a notified effect actually runs. When a
//! write notifies an effect that was registered with a scheduler, the runtime
//! calls [`Scheduler::schedule`] with the effect instead of running it.
//!
//! # Strategies
//!
//! - [`DeferredScheduler`] moves the run to a later turn of the runtime's
//!   task queue, after the synchronous code that caused it.
//! - [`BatchScheduler`] collects effects in a deduplicating pending set and
//!   flushes it once in a microtask, so a burst of writes produces exactly
//!   one run per affected effect, observing only the final state.
//! - [`TokioScheduler`] spawns the run on a tokio `LocalSet`.
//!
//! Any `Fn(EffectRunner)` closure is also a scheduler.
//!
//! # Host task queue
//!
//! Deferred and batched work goes to the runtime's [`TaskQueue`], which has a
//! microtask lane and a macrotask lane. The host drives it with
//! [`Runtime::run_until_idle`](crate::Runtime::run_until_idle), typically at
//! the end of each synchronous turn.

mod batch;
mod deferred;
mod local;
mod queue;

pub use batch::BatchScheduler;
pub use deferred::DeferredScheduler;
pub use local::TokioScheduler;

pub(crate) use queue::TaskQueue;

use crate::error::Result;
use crate::reactive::EffectRunner;

/// Policy for running a notified effect.
pub trait Scheduler {
    /// Take responsibility for running `runner`.
    ///
    /// An error is reported to the runtime's error handler, or returned from
    /// the write that triggered the effect. It never stops the remaining
    /// effects of that write from being notified.
    fn schedule(&self, runner: EffectRunner) -> Result<()>;
}

impl<F> Scheduler for F
where
    F: Fn(EffectRunner),
{
    fn schedule(&self, runner: EffectRunner) -> Result<()> {
        self(runner);
        Ok(())
    }
}
