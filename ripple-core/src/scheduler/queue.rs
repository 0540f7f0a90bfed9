//! Host Task Queue
//!
//! A minimal event-loop model with two FIFO lanes:
//!
//! - microtasks run at the next checkpoint, before any further macrotask
//! - macrotasks run one per turn, each followed by a microtask checkpoint
//!
//! Tasks are popped before they run and no borrow is held while they run, so
//! a task may freely queue more tasks. A panicking task propagates to the
//! caller of the drain and leaves the rest of the queue intact.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::{ReactiveError, Result};

pub(crate) type Task = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct TaskQueue {
    microtasks: RefCell<VecDeque<Task>>,
    macrotasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub(crate) fn queue_microtask(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }

    pub(crate) fn queue_task(&self, task: Task) {
        self.macrotasks.borrow_mut().push_back(task);
    }

    /// Number of queued `(microtasks, macrotasks)`.
    pub(crate) fn pending(&self) -> (usize, usize) {
        (self.microtasks.borrow().len(), self.macrotasks.borrow().len())
    }

    /// Drain the microtask lane, including tasks queued while draining.
    pub(crate) fn run_microtasks(&self, budget: usize) -> Result<usize> {
        let mut ran = 0;
        self.drain_microtasks(&mut ran, budget)?;
        Ok(ran)
    }

    /// Alternate microtask checkpoints and single macrotasks until both lanes are empty.
    pub(crate) fn run_until_idle(&self, budget: usize) -> Result<usize> {
        let mut ran = 0;
        loop {
            self.drain_microtasks(&mut ran, budget)?;

            if self.macrotasks.borrow().is_empty() {
                return Ok(ran);
            }
            if ran >= budget {
                return Err(ReactiveError::TaskBudgetExceeded { budget });
            }

            let task = self.macrotasks.borrow_mut().pop_front();
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
    }

    fn drain_microtasks(&self, ran: &mut usize, budget: usize) -> Result<()> {
        loop {
            if self.microtasks.borrow().is_empty() {
                return Ok(());
            }
            if *ran >= budget {
                return Err(ReactiveError::TaskBudgetExceeded { budget });
            }

            let task = self.microtasks.borrow_mut().pop_front();
            if let Some(task) = task {
                task();
                *ran += 1;
            }
        }
    }
}
