//! Progress reporting and cooperative cancellation
//!
//! Long operations (reading a whole cartridge, programming a save image)
//! report through the [`Task`] trait. The contract is:
//!
//! 1. `on_task_start(expected)` exactly once, before anything else
//! 2. `on_task_update(status, delta)` zero or more times, where `delta`
//!    is an increment, never a running total
//! 3. `on_task_end(status, total)` exactly once with the authoritative
//!    total, independent of what the updates added up to
//!
//! The running operation polls [`Task::is_task_cancelled`] at its own
//! cadence. Cancellation is advisory: it asks for an early stop at the
//! next safe point and promises nothing about when that is.
//!
//! A [`ForwardingTask`] lets a sub-operation report in its own units
//! while the parent sees progress in the parent's units.

mod forward;
mod progress;

pub use forward::ForwardingTask;
pub use progress::{CancelToken, TaskProgress};

use core::fmt;

/// Lifecycle of a task
///
/// `NotStarted -> Starting -> Running -> (Stopping) -> {Completed | Cancelled | Error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    /// `on_task_start` has not been called yet
    #[default]
    NotStarted,
    /// Expected work is known, no progress yet
    Starting,
    /// Work is being done
    Running,
    /// Cancellation was observed and the operation is winding down
    Stopping,
    /// All requested work was done
    Completed,
    /// The operation stopped early because it was cancelled
    Cancelled,
    /// The operation failed; the concrete error travels separately
    Error,
}

impl TaskStatus {
    /// Whether this status ends the task
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Observer of a long-running operation
///
/// Work is counted in operation-defined units; the flash driver always
/// uses bytes.
pub trait Task {
    /// Called once before any update with the expected total work
    fn on_task_start(&mut self, expected_work: u64);

    /// Called with an increment of completed work
    fn on_task_update(&mut self, status: TaskStatus, work: u64);

    /// Called once at the end with the final status and total work done
    fn on_task_end(&mut self, status: TaskStatus, work: u64);

    /// Non-blocking check whether cancellation was requested
    fn is_task_cancelled(&self) -> bool;
}

impl<T: Task + ?Sized> Task for &mut T {
    fn on_task_start(&mut self, expected_work: u64) {
        (**self).on_task_start(expected_work)
    }

    fn on_task_update(&mut self, status: TaskStatus, work: u64) {
        (**self).on_task_update(status, work)
    }

    fn on_task_end(&mut self, status: TaskStatus, work: u64) {
        (**self).on_task_end(status, work)
    }

    fn is_task_cancelled(&self) -> bool {
        (**self).is_task_cancelled()
    }
}
