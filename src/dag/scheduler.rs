// src/dag/scheduler.rs

use tracing::{debug, error, info, warn};

use crate::dag::assembly::assemble_request;
use crate::dag::cancel::Canceller;
use crate::dag::journal;
use crate::dag::scheduler_step::SchedulerStep;
use crate::errors::{OmwsError, Result};
use crate::lock::with_experiment_lock;
use crate::store::{JobMetadata, Stage, TicketStore, progress};
use crate::ticket::Ticket;

/// The dependency scheduler.
///
/// Holds no state of its own: every call rebuilds what it needs from the
/// ticket directory, so it can run in any thread or process that received a
/// completion event. Runs for the same experiment are serialized by the
/// experiment lock.
#[derive(Debug, Clone)]
pub struct Scheduler {
    store: TicketStore,
    canceller: Canceller,
    skip_request: bool,
    create_done: bool,
}

impl Scheduler {
    pub fn new(store: TicketStore) -> Self {
        let canceller = Canceller::new(store.clone());
        Self {
            store,
            canceller,
            skip_request: false,
            create_done: false,
        }
    }

    /// Write assembled successor requests straight to `_proc` instead of
    /// `_req`, for executors that dispatch jobs themselves and never poll
    /// for requests.
    pub fn with_skip_request(mut self, skip_request: bool) -> Self {
        self.skip_request = skip_request;
        self
    }

    /// Write the job's done sentinel on behalf of an executor that cannot.
    pub fn with_create_done(mut self, create_done: bool) -> Self {
        self.create_done = create_done;
        self
    }

    /// Completion hook for `job`.
    ///
    /// Safe to call more than once for the same job. Jobs that do not belong
    /// to an experiment need no scheduling and return an empty step.
    pub fn on_job_completed(&self, job: &Ticket) -> Result<SchedulerStep> {
        if self.create_done && !self.store.is_done(job) {
            if !self.store.ticket_exists(job) {
                return Err(OmwsError::UnknownTicket(job.to_string()));
            }
            self.store.mark_done(job)?;
            debug!(ticket = %job, "done sentinel written by completion hook");
        }

        // Metadata is written once at submission and never changes.
        let meta = self.store.read_metadata(job)?;
        let experiment = match (&meta.experiment, meta.is_experiment()) {
            (Some(exp), false) => exp.clone(),
            _ => {
                debug!(ticket = %job, "completion of a job outside any experiment; nothing to schedule");
                return Ok(SchedulerStep::default());
            }
        };

        let step = with_experiment_lock(&self.store, &experiment, || {
            self.advance(&experiment, job, &meta)
        })?;

        info!(
            experiment = %experiment,
            ticket = %job,
            runnable = ?step.newly_runnable,
            cancelled = step.cancelled.len(),
            finished = step.experiment_finished,
            "scheduler step complete"
        );
        Ok(step)
    }

    fn advance(&self, experiment: &Ticket, job: &Ticket, meta: &JobMetadata) -> Result<SchedulerStep> {
        if self.store.is_done(experiment) {
            debug!(experiment = %experiment, ticket = %job, "experiment already done; ignoring completion");
            return Ok(SchedulerStep::already_done());
        }

        if !self.store.is_done(job) {
            return Err(OmwsError::NotTerminal(job.to_string()));
        }

        let code = self.store.read_progress(job)?;
        journal(
            &self.store,
            experiment,
            &format!("Job {job} finished with progress {code}"),
        );

        if code != progress::COMPLETE {
            warn!(experiment = %experiment, ticket = %job, progress = code, "job failed; stopping experiment");
            let cancelled = self.canceller.stop_experiment(experiment, Some(job))?;
            return Ok(SchedulerStep::cancelled(cancelled));
        }

        if meta.next.is_empty() {
            return self.maybe_finish(experiment, job);
        }

        let mut step = SchedulerStep::default();
        for successor in &meta.next {
            match self.try_promote(experiment, successor) {
                Ok(true) => step.newly_runnable.push(successor.clone()),
                Ok(false) => {}
                Err(e) => {
                    error!(
                        experiment = %experiment,
                        ticket = %successor,
                        error = %e,
                        "could not prepare successor; stopping experiment"
                    );
                    journal(
                        &self.store,
                        experiment,
                        &format!("Could not prepare job {successor}: {e}"),
                    );
                    let cancelled = self.canceller.stop_experiment(experiment, Some(job))?;
                    let mut stopped = SchedulerStep::cancelled(cancelled);
                    stopped.newly_runnable = step.newly_runnable;
                    return Ok(stopped);
                }
            }
        }
        Ok(step)
    }

    /// A leaf finished: the experiment is complete once every member is.
    fn maybe_finish(&self, experiment: &Ticket, job: &Ticket) -> Result<SchedulerStep> {
        let exp_meta = self.store.read_metadata(experiment)?;

        let mut pending = 0usize;
        let mut failed = None;
        for member in &exp_meta.jobs {
            if !self.store.is_done(member) {
                pending += 1;
            } else if self.store.read_progress(member)? != progress::COMPLETE {
                failed = Some(member);
            }
        }

        if let Some(member) = failed {
            // Its own hook has not run yet; do not let the experiment succeed.
            warn!(experiment = %experiment, ticket = %member, "found failed member while finishing");
            let cancelled = self.canceller.stop_experiment(experiment, Some(job))?;
            return Ok(SchedulerStep::cancelled(cancelled));
        }

        if pending > 0 {
            debug!(experiment = %experiment, pending, "other branches still running");
            return Ok(SchedulerStep::default());
        }

        self.store.finish(experiment, progress::COMPLETE)?;
        journal(&self.store, experiment, "Experiment finished");
        info!(experiment = %experiment, "experiment finished");
        Ok(SchedulerStep {
            experiment_finished: true,
            ..SchedulerStep::default()
        })
    }

    /// Materialize `successor`'s request if all of its dependencies are
    /// done. `Ok(false)` means "not yet" or "already promoted".
    fn try_promote(&self, experiment: &Ticket, successor: &Ticket) -> Result<bool> {
        let meta = self.store.read_metadata(successor)?;

        match self.store.payload_stage(meta.job_type, successor) {
            Some(Stage::Pending) => {}
            Some(stage) => {
                debug!(ticket = %successor, stage = stage.suffix(), "successor already promoted");
                return Ok(false);
            }
            None if self.store.is_done(successor) => return Ok(false),
            None => {
                return Err(OmwsError::CorruptState {
                    path: self.store.dir().display().to_string(),
                    reason: format!("job {successor} has no payload file"),
                });
            }
        }

        for dep in &meta.prev {
            if !self.store.is_done(&dep.ticket) {
                debug!(ticket = %successor, dependency = %dep.ticket, "dependency not done yet");
                return Ok(false);
            }
            let code = self.store.read_progress(&dep.ticket)?;
            if code != progress::COMPLETE {
                return Err(OmwsError::InvalidRequest(format!(
                    "dependency {} of {} ended with progress {}",
                    dep.ticket, successor, code
                )));
            }
        }

        let request = assemble_request(&self.store, successor, &meta)?;
        self.store
            .write_payload(meta.job_type, Stage::Pending, successor, &request)?;
        let target = if self.skip_request {
            Stage::Processed
        } else {
            Stage::Request
        };
        if !self.store.promote(meta.job_type, successor, Stage::Pending, target)? {
            return Err(OmwsError::CorruptState {
                path: self.store.dir().display().to_string(),
                reason: format!("pending file of {successor} vanished during promotion"),
            });
        }

        journal(
            &self.store,
            experiment,
            &format!("Job {successor} is ready to run"),
        );
        Ok(true)
    }
}
