//! Deferred scheduling: run notified effects on a later turn.

use std::rc::Weak;

use super::Scheduler;
use crate::error::{ReactiveError, Result};
use crate::reactive::{EffectRunner, Runtime, RuntimeInner};

/// Queues every notified effect as a macrotask on the runtime's task queue.
///
/// The effect runs when the host next drives the queue, so it observes the
/// state left behind by all synchronous code that ran before that.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::{DeferredScheduler, EffectOptions, Runtime};
///
/// let rt = Runtime::new();
/// let state = rt.observe(&serde_json::json!({ "foo": 1 })).unwrap();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (state_clone, log_clone) = (state.clone(), log.clone());
/// rt.effect_with(
///     move || log_clone.borrow_mut().push(state_clone.get_as::<i64>("foo").unwrap().to_string()),
///     EffectOptions::new().scheduler(DeferredScheduler::new(&rt)),
/// );
///
/// state.update::<i64, _>("foo", |n| n + 1).unwrap();
/// log.borrow_mut().push("end".to_string());
/// rt.run_until_idle().unwrap();
///
/// assert_eq!(*log.borrow(), ["1", "end", "2"]);
/// ```
#[derive(Clone)]
pub struct DeferredScheduler {
    runtime: Weak<RuntimeInner>,
}

impl DeferredScheduler {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.downgrade(),
        }
    }
}

impl Scheduler for DeferredScheduler {
    fn schedule(&self, runner: EffectRunner) -> Result<()> {
        let runtime = self.runtime.upgrade().ok_or(ReactiveError::RuntimeDropped)?;
        tracing::trace!(effect = %runner.id(), "deferring effect");
        runtime.tasks.queue_task(Box::new(move || runner.run()));
        Ok(())
    }
}
