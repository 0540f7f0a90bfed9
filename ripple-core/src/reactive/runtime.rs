//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observables,
//! effects and computed values. It owns the dependency store, the
//! active-effect stack and the host task queue.
//!
//! # How It Works
//!
//! 1. When an effect runs, it is pushed onto the runtime's stack.
//!
//! 2. When an observable field is read, the runtime subscribes the effect on
//!    top of the stack to that `(object, key)` pair ("track").
//!
//! 3. When a field is written, the runtime looks up the pair's subscribers
//!    ("trigger") and, working from a snapshot that leaves out the currently
//!    running effect:
//!    a. hands effects with a scheduler to that scheduler
//!    b. runs every other effect synchronously, in subscription order
//!
//! # Instances
//!
//! Nothing here is global. Each [`Runtime`] is an independent world, so tests
//! and embedders can run as many as they like side by side. Handles created
//! by a runtime keep only a weak reference back to it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use super::computed::Computed;
use super::context::EffectStack;
use super::effect::{Effect, EffectOptions};
use super::key::{EffectId, PropertyKey, TargetId};
use super::observable::Observable;
use super::store::DepStore;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::scheduler::TaskQueue;

type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) store: RefCell<DepStore>,
    pub(crate) stack: EffectStack,
    pub(crate) tasks: TaskQueue,
    error_handler: RefCell<Option<ErrorHandler>>,
}

impl RuntimeInner {
    /// Subscribe the active effect to `(target, key)`.
    pub(crate) fn track(&self, target: TargetId, key: &PropertyKey) {
        let Some(active) = self.stack.active() else {
            return;
        };

        let set = self.store.borrow_mut().dep_set(target, key);
        if set.insert(&active) {
            active.core().record(&set);
            tracing::trace!(effect = %active.id(), object = %target, %key, "tracked dependency");
        }
    }

    /// Notify every effect subscribed to `(target, key)`.
    pub(crate) fn trigger(&self, target: TargetId, key: &PropertyKey) -> Result<()> {
        let Some(set) = self.store.borrow().get(target, key) else {
            return Ok(());
        };

        // An effect that writes what it reads must not wake itself, even
        // from inside an untracked scope.
        let runners = set.snapshot(self.stack.running_id());
        drop(set);

        tracing::trace!(object = %target, %key, effects = runners.len(), "triggering dependents");

        let mut first_failure = None;
        for runner in runners {
            // An earlier effect in this batch may have stopped it.
            if runner.is_stopped() {
                continue;
            }

            let Some(scheduler) = runner.scheduler() else {
                runner.run();
                continue;
            };

            if let Err(err) = scheduler.schedule(runner.clone()) {
                tracing::warn!(effect = %runner.id(), error = %err, "scheduler failed");
                if let Some(err) = self.report(err) {
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop every dependency entry of a target that is going away.
    pub(crate) fn dispose_target(&self, target: TargetId) {
        let removed = match self.store.try_borrow_mut() {
            Ok(mut store) => store.dispose(target),
            Err(_) => {
                tracing::warn!(object = %target, "dependency store busy, leaking entry of dropped target");
                return;
            }
        };

        if removed.is_some() {
            tracing::debug!(object = %target, "disposed dependency entry");
        }
        drop(removed);
    }

    /// Hand a failure to the error handler, or back to the caller if none is set.
    fn report(&self, err: ReactiveError) -> Option<ReactiveError> {
        let handler = self.error_handler.borrow().clone();
        match handler {
            Some(handler) => {
                handler(&err);
                None
            }
            None => Some(err),
        }
    }

    fn run_microtasks(&self) -> Result<usize> {
        self.tasks
            .run_microtasks(self.config.task_budget)
            .inspect_err(|err| tracing::warn!(error = %err, "microtask drain aborted"))
    }

    fn run_until_idle(&self) -> Result<usize> {
        self.tasks
            .run_until_idle(self.config.task_budget)
            .inspect_err(|err| tracing::warn!(error = %err, "task queue drain aborted"))
    }
}

/// Handle to one reactive runtime.
///
/// Cloning is cheap and shares the runtime.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let state = rt.observe(&serde_json::json!({ "count": 1 })).unwrap();
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let (state_clone, seen_clone) = (state.clone(), seen.clone());
/// rt.effect(move || {
///     seen_clone.borrow_mut().push(state_clone.get_as::<i64>("count").unwrap());
/// });
///
/// state.set("count", 2).unwrap();
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                store: RefCell::new(DepStore::default()),
                stack: EffectStack::default(),
                tasks: TaskQueue::default(),
                error_handler: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Place a plain value under observation.
    ///
    /// The value must serialize to an object (fields become `Name` keys) or
    /// an array (elements become `Index` keys).
    pub fn observe<T: Serialize + ?Sized>(&self, raw: &T) -> Result<Observable> {
        let value = serde_json::to_value(raw).map_err(ReactiveError::Encode)?;
        self.observe_value(value)
    }

    /// Place an already-built JSON value under observation.
    pub fn observe_value(&self, value: Value) -> Result<Observable> {
        Observable::new(self.downgrade(), value)
    }

    /// Register an effect and run it once.
    pub fn effect<T, F>(&self, body: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.effect_with(body, EffectOptions::default())
    }

    /// Register an effect with options. Unless `lazy` is set it runs once now.
    pub fn effect_with<T, F>(&self, body: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let lazy = options.lazy;
        let effect = Effect::new(self.downgrade(), body, options);
        if !lazy {
            // The initial value of an eager effect has no receiver.
            let _ = effect.run();
        }
        effect
    }

    /// Create a cached value derived from `getter`.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(self.downgrade(), getter)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Subscribe the running effect to `(target, key)`.
    ///
    /// A no-op outside of any effect.
    pub fn track(&self, target: TargetId, key: &PropertyKey) {
        self.inner.track(target, key);
    }

    /// Notify the effects subscribed to `(target, key)`.
    pub fn trigger(&self, target: TargetId, key: &PropertyKey) -> Result<()> {
        self.inner.trigger(target, key)
    }

    /// Run `f` with tracking suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = self.inner.stack.enter_untracked();
        f()
    }

    /// The effect reads would currently subscribe, if any.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.stack.active_id()
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.stack.active_id().is_some()
    }

    /// Number of effects subscribed to `(target, key)`.
    pub fn subscriber_count(&self, target: TargetId, key: &PropertyKey) -> usize {
        self.inner.store.borrow().subscriber_count(target, key)
    }

    /// Number of objects with at least one dependency entry.
    pub fn tracked_targets(&self) -> usize {
        self.inner.store.borrow().target_count()
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Receive scheduler failures here instead of from the triggering write.
    pub fn set_error_handler(&self, handler: impl Fn(&ReactiveError) + 'static) {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn clear_error_handler(&self) {
        self.inner.error_handler.borrow_mut().take();
    }

    // ------------------------------------------------------------------
    // Host task queue
    // ------------------------------------------------------------------

    /// Queue `task` to run at the next microtask checkpoint.
    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.tasks.queue_microtask(Box::new(task));
    }

    /// Queue `task` to run on a later turn.
    pub fn queue_task(&self, task: impl FnOnce() + 'static) {
        self.inner.tasks.queue_task(Box::new(task));
    }

    /// Drain the microtask lane. Returns the number of tasks run.
    pub fn run_microtasks(&self) -> Result<usize> {
        self.inner.run_microtasks()
    }

    /// Run queued work until both lanes are empty. Returns the number of tasks run.
    ///
    /// Microtasks are drained before every macrotask, matching an event
    /// loop turn.
    pub fn run_until_idle(&self) -> Result<usize> {
        self.inner.run_until_idle()
    }

    /// Number of queued `(microtasks, macrotasks)`.
    pub fn pending_tasks(&self) -> (usize, usize) {
        self.inner.tasks.pending()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("tracked_targets", &self.tracked_targets())
            .field("stack_depth", &self.inner.stack.depth())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}
