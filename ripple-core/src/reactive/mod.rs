//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: observables,
//! effects, and computed values, tied together by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Observables
//!
//! An Observable wraps a plain data object. Reading a field inside an effect
//! subscribes the effect to that one field; writing a field re-runs the
//! effects subscribed to it.
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever a field it read changes.
//! Before every run it drops all of its subscriptions and rebuilds them from
//! the reads it actually performs, so conditional reads never leave stale
//! subscriptions behind. Effects may nest; reads are attributed to the
//! innermost running effect.
//!
//! ## Computed values
//!
//! A Computed is a cached derived value. It recomputes lazily, only after
//! something it read has changed, and it is itself observable by effects.
//!
//! ## Schedulers
//!
//! By default a notified effect runs synchronously inside the write. An
//! effect registered with a [`Scheduler`](crate::scheduler::Scheduler) is
//! handed to it instead, which can defer, deduplicate, or batch the run.
//!
//! # Implementation Notes
//!
//! Dependencies live in a side table keyed by object identity and property
//! key. Each effect also remembers which dependency sets it joined, so its
//! subscriptions can be dropped without scanning the whole table.

mod computed;
mod context;
mod effect;
mod key;
mod observable;
mod runtime;
mod store;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions, EffectRunner};
pub use key::{EffectId, PropertyKey, SymbolKey, TargetId};
pub use observable::{Observable, Shape};
pub use runtime::Runtime;

pub(crate) use runtime::RuntimeInner;
