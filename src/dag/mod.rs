// src/dag/mod.rs

//! Experiment DAGs and their scheduling.
//!
//! - [`graph`] validates a submitted experiment plan (petgraph).
//! - [`assembly`] builds a successor's request from its dependencies.
//! - [`scheduler`] is the completion hook that advances an experiment.
//! - [`cancel`] retires queued members and stops experiments.
//! - [`scheduler_step`] describes what one scheduler call changed.

use tracing::warn;

use crate::store::TicketStore;
use crate::ticket::Ticket;

pub mod assembly;
pub mod cancel;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;

pub use cancel::Canceller;
pub use graph::{ExperimentGraph, ExperimentPlan, PlannedJob};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;

/// Append a line to a ticket's log. A failed log write never aborts the
/// state transition it describes.
pub(crate) fn journal(store: &TicketStore, ticket: &Ticket, line: &str) {
    if let Err(e) = store.append_log(ticket, line) {
        warn!(ticket = %ticket, error = %e, "could not append to job log");
    }
}
