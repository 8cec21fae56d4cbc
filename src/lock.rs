// src/lock.rs

//! The Exclusive Section: one writer per experiment graph.

use tracing::{debug, trace};

use crate::errors::Result;
use crate::store::TicketStore;
use crate::ticket::Ticket;

/// Run `f` while holding the experiment's advisory lock.
///
/// Blocks without timeout while another thread or process holds it. The
/// lock is released when `f` returns, errors or unwinds.
pub fn with_experiment_lock<T, F>(store: &TicketStore, experiment: &Ticket, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    trace!(experiment = %experiment, "waiting for experiment lock");
    let guard = store.lock(experiment)?;
    debug!(experiment = %experiment, lock = ?guard.path(), "experiment lock held");
    let out = f();
    drop(guard);
    trace!(experiment = %experiment, "experiment lock released");
    out
}
