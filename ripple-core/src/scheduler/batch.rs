//! Batched scheduling: deduplicate notified effects and flush them once.
//!
//! Every schedule call adds the effect to a pending set. The first call of a
//! burst also queues one flush as a microtask; later calls only grow the set.
//! The flush runs each pending effect once, after the synchronous writes that
//! caused it, so it sees their final state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use super::Scheduler;
use crate::error::{ReactiveError, Result};
use crate::reactive::{EffectRunner, Runtime, RuntimeInner};

#[derive(Default)]
struct BatchState {
    pending: RefCell<IndexSet<EffectRunner>>,
    /// A flush is queued or in progress.
    flushing: Cell<bool>,
}

impl BatchState {
    fn flush(&self) {
        let _reset = FlushGuard(&self.flushing);

        loop {
            let jobs = std::mem::take(&mut *self.pending.borrow_mut());
            if jobs.is_empty() {
                return;
            }

            tracing::debug!(jobs = jobs.len(), "flushing batch");
            for job in jobs {
                job.run();
            }
        }
    }
}

/// Clears the flushing flag even if a job panics.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Collects notified effects into a deduplicating set and runs them in a
/// single microtask.
///
/// Clones share the same pending set, so effects registered with clones of
/// one scheduler batch together.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::{BatchScheduler, EffectOptions, Runtime};
///
/// let rt = Runtime::new();
/// let state = rt.observe(&serde_json::json!({ "foo": 1 })).unwrap();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (state_clone, log_clone) = (state.clone(), log.clone());
/// rt.effect_with(
///     move || log_clone.borrow_mut().push(state_clone.get_as::<i64>("foo").unwrap()),
///     EffectOptions::new().scheduler(BatchScheduler::new(&rt)),
/// );
///
/// state.update::<i64, _>("foo", |n| n + 1).unwrap();
/// state.update::<i64, _>("foo", |n| n + 1).unwrap();
/// rt.run_microtasks().unwrap();
///
/// assert_eq!(*log.borrow(), [1, 3]);
/// ```
#[derive(Clone)]
pub struct BatchScheduler {
    state: Rc<BatchState>,
    runtime: Weak<RuntimeInner>,
}

impl BatchScheduler {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            state: Rc::new(BatchState::default()),
            runtime: runtime.downgrade(),
        }
    }

    /// Number of effects waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.state.pending.borrow().len()
    }

    pub fn is_flushing(&self) -> bool {
        self.state.flushing.get()
    }

    /// Run the pending effects now instead of waiting for the microtask.
    ///
    /// The already queued microtask then finds nothing to do.
    pub fn flush(&self) {
        self.state.flush();
    }
}

impl Scheduler for BatchScheduler {
    fn schedule(&self, runner: EffectRunner) -> Result<()> {
        let state = &self.state;
        let id = runner.id();
        if !state.pending.borrow_mut().insert(runner) {
            tracing::trace!(effect = %id, "effect already pending");
        }

        if state.flushing.replace(true) {
            return Ok(());
        }

        let Some(runtime) = self.runtime.upgrade() else {
            // Nothing will ever flush this batch.
            state.flushing.set(false);
            let abandoned = std::mem::take(&mut *state.pending.borrow_mut());
            drop(abandoned);
            return Err(ReactiveError::RuntimeDropped);
        };

        let state = Rc::clone(state);
        runtime.tasks.queue_microtask(Box::new(move || state.flush()));
        Ok(())
    }
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("pending", &self.pending())
            .field("flushing", &self.is_flushing())
            .finish()
    }
}
