//! Scheduling onto a tokio `LocalSet`.
//!
//! Effects are `!Send`, so they cannot go through `tokio::spawn`. Each
//! notified effect becomes a local task instead; the host drives the set with
//! [`TokioScheduler::settle`] or by running its own futures on it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::task::{JoinHandle, LocalSet};

use super::Scheduler;
use crate::error::{ReactiveError, Result};
use crate::reactive::EffectRunner;

/// Runs every notified effect as a task on a tokio [`LocalSet`].
///
/// ```rust
/// use ripple_core::{EffectOptions, Runtime, TokioScheduler};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ripple_core::Result<()> {
/// let rt = Runtime::new();
/// let state = rt.observe(&serde_json::json!({ "n": 1 }))?;
/// let scheduler = TokioScheduler::new();
///
/// let state_clone = state.clone();
/// let effect = rt.effect_with(
///     move || {
///         state_clone.get("n");
///     },
///     EffectOptions::new().scheduler(scheduler.clone()),
/// );
///
/// state.set("n", 2)?;
/// assert_eq!(effect.run_count(), 1);
///
/// scheduler.settle().await?;
/// assert_eq!(effect.run_count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokioScheduler {
    local: Rc<LocalSet>,
    handles: Rc<RefCell<Vec<JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::with_local_set(Rc::new(LocalSet::new()))
    }

    /// Spawn onto an existing set, shared with other local work.
    pub fn with_local_set(local: Rc<LocalSet>) -> Self {
        Self {
            local,
            handles: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn local_set(&self) -> &Rc<LocalSet> {
        &self.local
    }

    /// Number of spawned effect runs not yet awaited by [`settle`](Self::settle).
    pub fn pending(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Drive the set until every spawned effect run has finished, including
    /// runs spawned by those runs.
    ///
    /// Must be called from within a tokio runtime. An effect that panicked
    /// surfaces as [`ReactiveError::Join`]; the remaining runs are left for
    /// the next call.
    pub async fn settle(&self) -> Result<()> {
        loop {
            let handles = std::mem::take(&mut *self.handles.borrow_mut());
            if handles.is_empty() {
                return Ok(());
            }

            tracing::debug!(tasks = handles.len(), "settling local effect tasks");
            self.local
                .run_until(async move {
                    for handle in handles {
                        handle.await?;
                    }
                    Ok::<_, ReactiveError>(())
                })
                .await?;
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, runner: EffectRunner) -> Result<()> {
        tracing::trace!(effect = %runner.id(), "spawning local effect task");
        let handle = self.local.spawn_local(async move { runner.run() });
        self.handles.borrow_mut().push(handle);
        Ok(())
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
