//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple fine-grained
//! reactivity engine. It implements:
//!
//! - Observables: plain data objects whose field reads are tracked
//! - Effects that re-run when a field they read is written
//! - Computed values: lazily recomputed, cached, and observable themselves
//! - Pluggable schedulers for deferring and batching effect runs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the runtime, dependency store and reactive primitives
//! - `scheduler`: scheduling strategies and the host task queue
//! - `config`: runtime configuration
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::Runtime;
//!
//! let rt = Runtime::new();
//! let state = rt.observe(&serde_json::json!({ "count": 1 })).unwrap();
//!
//! // Create a derived value
//! let state_clone = state.clone();
//! let doubled = rt.computed(move || state_clone.get_as::<i64>("count").unwrap() * 2);
//!
//! // Create an effect
//! let printed = Rc::new(RefCell::new(Vec::new()));
//! let (doubled_clone, printed_clone) = (doubled.clone(), printed.clone());
//! rt.effect(move || printed_clone.borrow_mut().push(doubled_clone.get()));
//!
//! // Update the state; the effect runs again through the computed value
//! state.set("count", 5).unwrap();
//! assert_eq!(*printed.borrow(), vec![2, 10]);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use reactive::{
    Computed, Effect, EffectOptions, EffectRunner, Observable, PropertyKey, Runtime,
};
pub use scheduler::{BatchScheduler, DeferredScheduler, Scheduler, TokioScheduler};
