//! Progress forwarding with rescaling
//!
//! A sub-operation (for example a transport's native batch read) reports
//! progress in whatever unit it likes: packets, words, percent. The parent
//! wants bytes, and it may be running several sub-operations under one
//! progress bar. `ForwardingTask` sits in between and maps the
//! sub-operation's expected work onto a target chosen by the caller.
//!
//! The forwarder never calls the parent's `on_task_start`/`on_task_end`.
//! Those brackets belong to whoever owns the parent, so one parent total
//! can span several forwarded sub-operations.

use super::{Task, TaskStatus};

/// Task adapter that rescales progress into a parent task
///
/// Scaling is done on the cumulative count and the parent receives the
/// difference, so rounding never drifts: once the sub-operation reports
/// all of its expected work the parent has received exactly the target.
pub struct ForwardingTask<'a> {
    parent: &'a mut dyn Task,
    target: Option<u64>,
    sub_expected: u64,
    sub_done: u64,
    forwarded: u64,
}

impl<'a> ForwardingTask<'a> {
    /// Wrap `parent` without scaling
    ///
    /// Until [`scale_work_to`](Self::scale_work_to) is called, updates are
    /// relayed unchanged.
    pub fn new(parent: &'a mut dyn Task) -> Self {
        Self {
            parent,
            target: None,
            sub_expected: 0,
            sub_done: 0,
            forwarded: 0,
        }
    }

    /// Wrap `parent` and scale the sub-operation's work onto `target`
    pub fn scaled(parent: &'a mut dyn Task, target: u64) -> Self {
        let mut task = Self::new(parent);
        task.scale_work_to(target);
        task
    }

    /// Map the sub-operation's total onto `target` parent units
    ///
    /// Must be called before the sub-operation starts.
    pub fn scale_work_to(&mut self, target: u64) {
        self.target = Some(target);
    }

    /// Parent units relayed so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Sub-operation units reported so far
    pub fn sub_done(&self) -> u64 {
        self.sub_done
    }

    fn scale(&self, done: u64) -> u64 {
        match self.target {
            Some(target) if self.sub_expected > 0 => {
                let done = done.min(self.sub_expected);
                ((done as u128 * target as u128) / self.sub_expected as u128) as u64
            }
            _ => done,
        }
    }
}

impl Task for ForwardingTask<'_> {
    fn on_task_start(&mut self, expected_work: u64) {
        self.sub_expected = expected_work;
        self.sub_done = 0;
        self.forwarded = 0;
    }

    fn on_task_update(&mut self, status: TaskStatus, work: u64) {
        self.sub_done = self.sub_done.saturating_add(work);
        let scaled = self.scale(self.sub_done);
        let delta = scaled.saturating_sub(self.forwarded);
        self.forwarded = scaled.max(self.forwarded);
        self.parent.on_task_update(status, delta);
    }

    fn on_task_end(&mut self, _status: TaskStatus, _work: u64) {}

    fn is_task_cancelled(&self) -> bool {
        self.parent.is_task_cancelled()
    }
}
