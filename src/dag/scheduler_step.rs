// src/dag/scheduler_step.rs

//! Result type of one scheduler invocation.

use crate::ticket::Ticket;

/// What a single `on_job_completed` call changed.
///
/// Production code only logs it; tests use it to assert on transitions
/// without re-scanning the ticket directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Successors whose request file was materialized in this step.
    pub newly_runnable: Vec<Ticket>,
    /// Members forced to the cancelled state in this step.
    pub cancelled: Vec<Ticket>,
    /// The experiment reached progress 100 in this step.
    pub experiment_finished: bool,
    /// The experiment was stopped in this step.
    pub experiment_cancelled: bool,
    /// The experiment was already done; nothing was touched.
    pub already_done: bool,
}

impl SchedulerStep {
    pub(crate) fn already_done() -> Self {
        Self {
            already_done: true,
            ..Self::default()
        }
    }

    pub(crate) fn cancelled(members: Vec<Ticket>) -> Self {
        Self {
            cancelled: members,
            experiment_cancelled: true,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.newly_runnable.is_empty()
            && self.cancelled.is_empty()
            && !self.experiment_finished
            && !self.experiment_cancelled
    }
}
