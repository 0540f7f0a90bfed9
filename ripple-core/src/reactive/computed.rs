//! Computed Implementation
//!
//! A Computed is a cached derived value built on a lazy effect.
//!
//! # How Computed Values Work
//!
//! 1. The getter is registered as a lazy effect, so nothing runs until the
//!    first read.
//!
//! 2. Reading `get()` while dirty runs the getter effect, caches the result
//!    and clears the dirty flag. Reading while clean returns the cache.
//!
//! 3. The getter effect has a scheduler instead of re-running eagerly: when a
//!    dependency changes it only marks the value dirty.
//!
//! # Propagation to outer effects
//!
//! The getter runs as its own effect, so an outer effect that reads `get()`
//! never sees the getter's dependencies. To bridge the two, every computed
//! value owns a private target and symbol key:
//!
//! - `get()` subscribes the running effect to that private key.
//! - the getter's scheduler notifies that private key after marking dirty.
//!
//! This indirection is what wakes an outer effect when something the getter
//! read changes; invalidating the getter's own keys instead would not.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::effect::{Effect, EffectOptions, EffectRunner};
use super::key::{PropertyKey, TargetId};
use super::runtime::RuntimeInner;
use crate::error::Result;
use crate::scheduler::Scheduler;

/// Getter scheduler: mark dirty, then wake whoever read the value.
struct Invalidate {
    runtime: Weak<RuntimeInner>,
    target: TargetId,
    key: PropertyKey,
    dirty: Rc<Cell<bool>>,
}

impl Scheduler for Invalidate {
    fn schedule(&self, _getter: EffectRunner) -> Result<()> {
        self.dirty.set(true);
        match self.runtime.upgrade() {
            Some(runtime) => runtime.trigger(self.target, &self.key),
            None => Ok(()),
        }
    }
}

struct ComputedInner<T> {
    /// Private identity that outer effects subscribe to.
    target: TargetId,
    key: PropertyKey,
    dirty: Rc<Cell<bool>>,
    value: RefCell<Option<T>>,
    getter: Effect<T>,
    runtime: Weak<RuntimeInner>,
}

impl<T> ComputedInner<T> {
    fn track(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(self.target, &self.key);
        }
    }
}

impl<T: Clone> ComputedInner<T> {
    fn cached(&self) -> Option<T> {
        if self.dirty.get() {
            return None;
        }
        self.value.borrow().clone()
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        tracing::debug!(effect = %self.getter.id(), object = %self.target, "dropping computed value");
        self.getter.stop();
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_target(self.target);
        }
    }
}

/// A cached value derived from reactive state.
///
/// Cloning shares the cache.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let a = rt.observe(&serde_json::json!({ "x": 1, "y": 2 })).unwrap();
///
/// let a_clone = a.clone();
/// let sum = rt.computed(move || {
///     a_clone.get_as::<i64>("x").unwrap() + a_clone.get_as::<i64>("y").unwrap()
/// });
///
/// assert_eq!(sum.get(), 3);
/// a.set("x", 10).unwrap();
/// assert_eq!(sum.get(), 12);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new<F>(runtime: Weak<RuntimeInner>, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let target = TargetId::new();
        let key = PropertyKey::symbol("value");
        let dirty = Rc::new(Cell::new(true));

        let invalidate = Invalidate {
            runtime: runtime.clone(),
            target,
            key: key.clone(),
            dirty: Rc::clone(&dirty),
        };
        let getter = Effect::new(
            runtime.clone(),
            getter,
            EffectOptions::new()
                .lazy()
                .scheduler(invalidate)
                .name("computed"),
        );

        Self {
            inner: Rc::new(ComputedInner {
                target,
                key,
                dirty,
                value: RefCell::new(None),
                getter,
                runtime,
            }),
        }
    }

    /// Get the value, recomputing if a dependency changed since the last read.
    ///
    /// The running effect, if any, becomes a dependent of this value.
    pub fn get(&self) -> T {
        let inner = &self.inner;

        let value = match inner.cached() {
            Some(value) => value,
            None => {
                // A panicking getter leaves the value dirty, so the next read retries.
                let value = inner.getter.run();
                *inner.value.borrow_mut() = Some(value.clone());
                inner.dirty.set(false);
                value
            }
        };

        inner.track();
        value
    }

    /// Get the value without making the running effect depend on it.
    pub fn get_untracked(&self) -> T {
        match self.inner.runtime.upgrade() {
            Some(runtime) => {
                let _frame = runtime.stack.enter_untracked();
                self.get()
            }
            None => self.get(),
        }
    }
}

impl<T> Computed<T> {
    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether the getter has produced a value yet.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of effects that read this value on their last run.
    pub fn dependent_count(&self) -> usize {
        self.inner.runtime.upgrade().map_or(0, |runtime| {
            runtime
                .store
                .borrow()
                .subscriber_count(self.inner.target, &self.inner.key)
        })
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.getter.run_count()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
