//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever state it read changes.
//!
//! # How Effects Work
//!
//! Every run of an effect goes through the same steps:
//!
//! 1. Unsubscribe the effect from every dependency set it joined last time,
//!    and forget those sets.
//! 2. Push the effect onto the runtime's active-effect stack.
//! 3. Call the body. Each read subscribes the effect afresh.
//! 4. Pop the stack (in a drop guard, so this also happens on panic).
//! 5. Return whatever the body returned.
//!
//! Step 1 is what keeps branch switching correct: a field read on the
//! previous run but not on this one must stop waking the effect.
//!
//! # Options
//!
//! - `lazy`: do not run at registration; the caller runs the effect when it
//!   wants the value. Computed values are built on lazy effects.
//! - `scheduler`: when a dependency changes, hand the effect to the scheduler
//!   instead of running it synchronously.
//!
//! # Lifetime
//!
//! Dependency sets hold effects strongly, so an effect stays live while it is
//! subscribed to anything, even if every handle was dropped. [`Effect::stop`]
//! removes it from all of its sets.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::key::EffectId;
use super::runtime::RuntimeInner;
use super::store::DepSet;
use crate::scheduler::Scheduler;

/// Registration options for an effect.
///
/// ```rust
/// use ripple_core::{EffectOptions, Runtime};
///
/// let rt = Runtime::new();
/// let effect = rt.effect_with(|| 1 + 1, EffectOptions::new().lazy().name("sum"));
/// assert_eq!(effect.run_count(), 0);
/// assert_eq!(effect.run(), 2);
/// ```
#[derive(Clone, Default)]
pub struct EffectOptions {
    pub(crate) lazy: bool,
    pub(crate) scheduler: Option<Rc<dyn Scheduler>>,
    pub(crate) name: Option<Cow<'static, str>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run the effect at registration time.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Route notifications through `scheduler` instead of running synchronously.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Label the effect in logs.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("name", &self.name)
            .finish()
    }
}

/// State shared by every effect regardless of its return type.
pub(crate) struct EffectCore {
    id: EffectId,
    runtime: Weak<RuntimeInner>,
    options: EffectOptions,
    /// Dependency sets joined during the most recent run.
    deps: RefCell<SmallVec<[Weak<DepSet>; 4]>>,
    stopped: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectCore {
    /// Remember that the effect joined `set`.
    pub(crate) fn record(&self, set: &Rc<DepSet>) {
        self.deps.borrow_mut().push(Rc::downgrade(set));
    }

    /// Leave every dependency set joined on the previous run.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            if let Some(set) = dep.upgrade() {
                // Dropped after the set's borrow is released.
                let _removed = set.remove(self.id);
            }
        }
    }

    fn dependency_count(&self) -> usize {
        self.deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }
}

/// Type-erased view of an effect, as stored in dependency sets.
pub(crate) trait ErasedEffect {
    fn core(&self) -> &EffectCore;
    fn run_erased(self: Rc<Self>);
}

struct EffectInner<T> {
    core: EffectCore,
    body: Box<dyn Fn() -> T>,
}

impl<T: 'static> ErasedEffect for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn run_erased(self: Rc<Self>) {
        let _ = execute(&self);
    }
}

/// Run one effect with cleanup and stack bookkeeping.
fn execute<T: 'static>(inner: &Rc<EffectInner<T>>) -> T {
    let core = &inner.core;
    core.run_count.set(core.run_count.get() + 1);

    let runtime = match core.runtime.upgrade() {
        Some(runtime) if !core.stopped.get() => runtime,
        // Stopped or orphaned effects run their body without tracking.
        _ => return (inner.body)(),
    };

    core.cleanup();

    let _span = runtime.config.trace_effects.then(|| {
        tracing::trace_span!("effect", id = %core.id, name = ?core.options.name).entered()
    });
    tracing::trace!(effect = %core.id, run = core.run_count.get(), "running effect");

    let runner = EffectRunner(Rc::clone(inner) as Rc<dyn ErasedEffect>);
    let _frame = runtime.stack.enter(runner);
    (inner.body)()
}

/// A registered effect.
///
/// Cloning the handle shares the same effect. `T` is whatever the body
/// returns; plain side effects use `()`.
pub struct Effect<T = ()> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    pub(crate) fn new<F>(runtime: Weak<RuntimeInner>, body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new(EffectInner {
            core: EffectCore {
                id: EffectId::new(),
                runtime,
                options,
                deps: RefCell::new(SmallVec::new()),
                stopped: Cell::new(false),
                run_count: Cell::new(0),
            },
            body: Box::new(body),
        });
        tracing::debug!(
            effect = %inner.core.id,
            name = ?inner.core.options.name,
            lazy = inner.core.options.lazy,
            "registered effect"
        );
        Self { inner }
    }

    /// Run the effect now, refreshing its dependencies, and return the body's value.
    pub fn run(&self) -> T {
        execute(&self.inner)
    }

    /// Type-erased handle, as handed to schedulers.
    pub fn runner(&self) -> EffectRunner {
        EffectRunner(Rc::clone(&self.inner) as Rc<dyn ErasedEffect>)
    }
}

impl<T> Effect<T> {
    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    /// Unsubscribe from everything and never track again.
    ///
    /// A stopped effect can still be run by hand; its body then runs untracked.
    pub fn stop(&self) {
        if self.inner.core.stopped.replace(true) {
            return;
        }
        self.inner.core.cleanup();
        tracing::debug!(effect = %self.id(), "stopped effect");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.core.stopped.get()
    }

    /// Number of times the body has been invoked.
    pub fn run_count(&self) -> usize {
        self.inner.core.run_count.get()
    }

    /// Number of `(object, key)` pairs read on the most recent run.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }

    pub fn options(&self) -> &EffectOptions {
        &self.inner.core.options
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = &self.inner.core;
        f.debug_struct("Effect")
            .field("id", &core.id)
            .field("name", &core.options.name)
            .field("run_count", &core.run_count.get())
            .field("dependency_count", &core.dependency_count())
            .field("stopped", &core.stopped.get())
            .finish()
    }
}

/// An effect with its return type erased.
///
/// This is what dependency sets store and what schedulers receive. Equality
/// and hashing follow effect identity, so a set of runners deduplicates
/// repeated notifications of the same effect.
#[derive(Clone)]
pub struct EffectRunner(Rc<dyn ErasedEffect>);

impl EffectRunner {
    pub fn id(&self) -> EffectId {
        self.0.core().id
    }

    /// Run the effect, discarding its value.
    pub fn run(&self) {
        Rc::clone(&self.0).run_erased();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.core().stopped.get()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.core().options.name.as_deref()
    }

    pub(crate) fn core(&self) -> &EffectCore {
        self.0.core()
    }

    pub(crate) fn scheduler(&self) -> Option<Rc<dyn Scheduler>> {
        self.0.core().options.scheduler.clone()
    }
}

impl PartialEq for EffectRunner {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EffectRunner {}

impl Hash for EffectRunner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for EffectRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRunner")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
