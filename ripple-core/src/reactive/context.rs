//! Active-Effect Stack
//!
//! The stack records which effect is currently running. Reads subscribe the
//! top frame only, so a nested effect temporarily shadows its parent and the
//! parent becomes active again as soon as the nested run returns.
//!
//! # Implementation
//!
//! Frames are pushed by [`EffectStack::enter`] and popped when the returned
//! guard is dropped. Because the pop lives in `Drop`, a panicking effect body
//! still releases its frame and cannot corrupt tracking for effects that run
//! afterwards.
//!
//! The stack belongs to one [`Runtime`](super::Runtime); independent runtimes
//! never observe each other's frames.

use std::cell::RefCell;

use super::effect::EffectRunner;
use super::key::EffectId;

/// One entry on the stack.
#[derive(Clone)]
enum Frame {
    /// An effect is running; reads subscribe it.
    Effect(EffectRunner),
    /// Tracking is suspended; reads subscribe nothing.
    Untracked,
}

impl Frame {
    fn effect_id(&self) -> Option<EffectId> {
        match self {
            Frame::Effect(runner) => Some(runner.id()),
            Frame::Untracked => None,
        }
    }
}

/// The per-runtime stack of running effects, innermost last.
#[derive(Default)]
pub(crate) struct EffectStack {
    frames: RefCell<Vec<Frame>>,
}

impl EffectStack {
    /// Make `runner` the active effect until the guard is dropped.
    pub(crate) fn enter(&self, runner: EffectRunner) -> StackGuard<'_> {
        let expected = Some(runner.id());
        self.frames.borrow_mut().push(Frame::Effect(runner));
        StackGuard { stack: self, expected }
    }

    /// Suspend tracking until the guard is dropped.
    pub(crate) fn enter_untracked(&self) -> StackGuard<'_> {
        self.frames.borrow_mut().push(Frame::Untracked);
        StackGuard {
            stack: self,
            expected: None,
        }
    }

    /// The effect that reads should subscribe, if any.
    pub(crate) fn active(&self) -> Option<EffectRunner> {
        match self.frames.borrow().last() {
            Some(Frame::Effect(runner)) => Some(runner.clone()),
            _ => None,
        }
    }

    pub(crate) fn active_id(&self) -> Option<EffectId> {
        self.frames.borrow().last().and_then(Frame::effect_id)
    }

    /// The innermost running effect, even while tracking is suspended.
    ///
    /// Notification must skip this effect so that it never wakes itself.
    pub(crate) fn running_id(&self) -> Option<EffectId> {
        self.frames.borrow().iter().rev().find_map(Frame::effect_id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Pops its frame when dropped.
pub(crate) struct StackGuard<'a> {
    stack: &'a EffectStack,
    expected: Option<EffectId>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.frames.borrow_mut().pop();

        // Guards are scoped, so frames must leave in LIFO order.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.effect_id(),
                self.expected,
                "effect stack mismatch: expected {:?}, got {:?}",
                self.expected,
                frame.effect_id()
            );
        }
    }
}
