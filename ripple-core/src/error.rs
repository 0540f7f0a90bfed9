//! Error types for the reactive runtime.

use thiserror::Error;

use crate::reactive::{EffectId, PropertyKey};

/// Errors surfaced by observables, schedulers and the host task queue.
///
/// Tracking itself never fails: a read outside any effect is a silent no-op,
/// and self-triggering is prevented structurally rather than reported.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The value passed to `observe` did not serialize to an object or array.
    #[error("only objects and arrays can be observed, got {kind}")]
    NotAnObject { kind: &'static str },

    /// A typed read found no field under the key.
    #[error("no field {0}")]
    MissingKey(PropertyKey),

    /// A value could not be converted into a field value.
    #[error("failed to encode field value")]
    Encode(#[source] serde_json::Error),

    /// A field value could not be converted into the requested type.
    #[error("failed to decode field value")]
    Decode(#[source] serde_json::Error),

    /// The runtime owning this handle has been dropped.
    #[error("reactive runtime has been dropped")]
    RuntimeDropped,

    /// A task queue drain ran more tasks than the configured budget allows.
    #[error("task budget of {budget} exhausted, effects keep rescheduling themselves")]
    TaskBudgetExceeded { budget: usize },

    /// A job spawned on a tokio local set panicked or was cancelled.
    #[error("deferred effect task failed")]
    Join(#[from] tokio::task::JoinError),

    /// A scheduler refused or failed to accept an effect.
    #[error("scheduler failed for effect {effect}: {message}")]
    Scheduler { effect: EffectId, message: String },
}

impl ReactiveError {
    /// Build a scheduler failure for the given effect.
    pub fn scheduler(effect: EffectId, message: impl Into<String>) -> Self {
        Self::Scheduler {
            effect,
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
