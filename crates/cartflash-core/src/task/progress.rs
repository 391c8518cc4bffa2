//! Concrete task that records what it is told

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use super::{Task, TaskStatus};

/// Shared cancellation flag
///
/// Clones share the same flag, so a UI thread can hold one clone and the
/// operation another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Task that keeps track of its status and progress
///
/// Useful on its own for callers that only want the numbers, and as the
/// state behind UI implementations.
#[derive(Debug, Default)]
pub struct TaskProgress {
    status: TaskStatus,
    expected: u64,
    accumulated: u64,
    total: Option<u64>,
    updates: usize,
    cancel: CancelToken,
}

impl TaskProgress {
    /// Create a task in the `NotStarted` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task that observes an existing cancellation token
    pub fn with_cancel_token(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// A clone of the cancellation token
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cancellation of the running operation
    pub fn cancel_task(&self) {
        self.cancel.cancel();
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Expected total work as given to `on_task_start`
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Sum of all update increments
    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    /// Number of `on_task_update` calls received
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Work done: the final total once ended, the accumulated sum before
    pub fn progress(&self) -> u64 {
        self.total.unwrap_or(self.accumulated)
    }

    /// Fraction of expected work done, in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.expected == 0 {
            return if self.status == TaskStatus::Completed {
                1.0
            } else {
                0.0
            };
        }
        let fraction = self.progress() as f64 / self.expected as f64;
        fraction.clamp(0.0, 1.0)
    }
}

impl Task for TaskProgress {
    fn on_task_start(&mut self, expected_work: u64) {
        if self.status != TaskStatus::NotStarted {
            log::warn!("task started twice (was {})", self.status);
        }
        self.status = TaskStatus::Starting;
        self.expected = expected_work;
        self.accumulated = 0;
        self.total = None;
        self.updates = 0;
    }

    fn on_task_update(&mut self, status: TaskStatus, work: u64) {
        self.status = status;
        self.accumulated = self.accumulated.saturating_add(work);
        self.updates += 1;
    }

    fn on_task_end(&mut self, status: TaskStatus, work: u64) {
        self.status = status;
        self.total = Some(work);
    }

    fn is_task_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut task = TaskProgress::new();
        assert_eq!(task.status(), TaskStatus::NotStarted);

        task.on_task_start(100);
        assert_eq!(task.status(), TaskStatus::Starting);
        assert_eq!(task.expected(), 100);

        task.on_task_update(TaskStatus::Running, 30);
        task.on_task_update(TaskStatus::Running, 20);
        assert_eq!(task.accumulated(), 50);
        assert_eq!(task.progress(), 50);
        assert_eq!(task.fraction(), 0.5);

        // The end total wins over the accumulated updates
        task.on_task_end(TaskStatus::Completed, 100);
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.progress(), 100);
        assert_eq!(task.accumulated(), 50);
        assert!(task.status().is_terminal());
    }

    #[test]
    fn test_cancel_only_after_request() {
        let task = TaskProgress::new();
        assert!(!task.is_task_cancelled());

        let token = task.cancel_token();
        token.cancel();
        assert!(task.is_task_cancelled());
    }

    #[test]
    fn test_shared_token() {
        let token = CancelToken::new();
        let task = TaskProgress::with_cancel_token(token.clone());
        assert!(!task.is_task_cancelled());
        task.cancel_task();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_zero_expected_fraction() {
        let mut task = TaskProgress::new();
        task.on_task_start(0);
        assert_eq!(task.fraction(), 0.0);
        task.on_task_end(TaskStatus::Completed, 0);
        assert_eq!(task.fraction(), 1.0);
    }
}
