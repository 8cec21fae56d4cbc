// src/dag/cancel.rs

//! The Cancellation Engine.
//!
//! Cancelling never interrupts a job that is already running. It only
//! retires queued work and marks the experiment done, so that a running
//! member's completion hook later sees the done experiment and stops.
//!
//! Callers are expected to hold the experiment lock.

use tracing::{debug, info, warn};

use crate::dag::journal;
use crate::errors::Result;
use crate::store::{Stage, TicketStore, progress};
use crate::ticket::Ticket;

#[derive(Debug, Clone)]
pub struct Canceller {
    store: TicketStore,
}

impl Canceller {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }

    /// Retire one queued job, or stop an experiment. `false` if it was done
    /// or already running.
    pub fn cancel_job(&self, ticket: &Ticket) -> Result<bool> {
        if self.store.is_done(ticket) {
            debug!(ticket = %ticket, "cancel: already done");
            return Ok(false);
        }

        let meta = self.store.read_metadata(ticket)?;
        if meta.is_experiment() {
            self.stop_experiment(ticket, None)?;
            return Ok(true);
        }

        let code = self.store.read_progress(ticket)?;
        if code != progress::QUEUED {
            debug!(ticket = %ticket, progress = code, "cancel: job is running; leaving it alone");
            return Ok(false);
        }

        let job_type = meta.job_type;
        let moved = self
            .store
            .promote(job_type, ticket, Stage::Pending, Stage::Processed)?
            || self.store.promote(job_type, ticket, Stage::Request, Stage::Processed)?;

        if !moved && self.store.payload_stage(job_type, ticket) == Some(Stage::Processed) {
            // Lost the rename race: the executor owns it now.
            debug!(ticket = %ticket, "cancel: executor picked the job up first");
            return Ok(false);
        }

        self.store.finish(ticket, progress::CANCELLED)?;
        info!(ticket = %ticket, "job cancelled");
        Ok(true)
    }

    /// Retire every unfinished member of `experiment` (except `except`, the
    /// member that triggered the stop) and mark the experiment cancelled.
    ///
    /// Member failures are logged and skipped; the experiment itself is
    /// always marked done.
    pub fn stop_experiment(&self, experiment: &Ticket, except: Option<&Ticket>) -> Result<Vec<Ticket>> {
        if self.store.is_done(experiment) {
            debug!(experiment = %experiment, "stop: experiment already done");
            return Ok(Vec::new());
        }

        let meta = self.store.read_metadata(experiment)?;
        let mut cancelled = Vec::new();
        for member in &meta.jobs {
            if Some(member) == except {
                continue;
            }
            match self.cancel_job(member) {
                Ok(true) => {
                    journal(&self.store, experiment, &format!("Cancelled job {member}"));
                    cancelled.push(member.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(experiment = %experiment, ticket = %member, error = %e, "could not cancel member");
                    journal(
                        &self.store,
                        experiment,
                        &format!("Could not cancel job {member}: {e}"),
                    );
                }
            }
        }

        self.store.finish(experiment, progress::CANCELLED)?;
        journal(&self.store, experiment, "Experiment cancelled");
        info!(experiment = %experiment, cancelled = cancelled.len(), "experiment stopped");
        Ok(cancelled)
    }
}
