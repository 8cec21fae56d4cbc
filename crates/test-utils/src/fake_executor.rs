use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use omws::dag::{Scheduler, SchedulerStep};
use omws::errors::Result;
use omws::store::{TicketStore, progress};
use omws::ticket::Ticket;
use omws::types::JobType;
use serde_json::Value;

use crate::builders::output_for;

/// How a fake job run ends.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Value),
    Failed(i32),
}

/// A fake Job Executor working on a real ticket directory.
///
/// It does what the external executor does: picks up `<type>_req.` files,
/// publishes `<type>_resp.` (or `stats.`) without touching the consumed
/// request, writes progress and `done.` last, then calls the completion hook. It also records which tickets it ran.
pub struct FakeExecutor {
    store: TicketStore,
    scheduler: Scheduler,
    overrides: HashMap<Ticket, Outcome>,
    executed: Arc<Mutex<Vec<Ticket>>>,
}

impl FakeExecutor {
    pub fn new(store: TicketStore) -> Self {
        let scheduler = Scheduler::new(store.clone());
        Self {
            store,
            scheduler,
            overrides: HashMap::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `ticket` end with `outcome` instead of the default output.
    pub fn with_outcome(mut self, ticket: &Ticket, outcome: Outcome) -> Self {
        self.overrides.insert(ticket.clone(), outcome);
        self
    }

    pub fn executed(&self) -> Vec<Ticket> {
        self.executed.lock().unwrap().clone()
    }

    /// Tickets that currently have a runnable request, sorted.
    pub fn runnable(&self) -> Vec<(Ticket, JobType)> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.store.dir()).expect("read ticket dir") {
            let name = entry.expect("dir entry").file_name().to_string_lossy().into_owned();
            let Some((prefix, ticket)) = name.split_once('.') else {
                continue;
            };
            let Some(tag) = prefix.strip_suffix("_req") else {
                continue;
            };
            if let (Some(job_type), Ok(ticket)) = (JobType::from_tag(tag), Ticket::parse(ticket)) {
                out.push((ticket, job_type));
            }
        }
        out.sort();
        out
    }

    /// Move a runnable request to processed. `false` if it was not runnable.
    pub fn take(&self, ticket: &Ticket, job_type: JobType) -> Result<bool> {
        if !self.store.promote_request_to_processed(job_type, ticket)? {
            return Ok(false);
        }
        self.store.write_progress(ticket, 0)?;
        Ok(true)
    }

    /// Write the outputs and terminal state of a taken job. Does not call
    /// the completion hook.
    pub fn finish(&self, ticket: &Ticket, job_type: JobType) -> Result<()> {
        let outcome = self
            .overrides
            .get(ticket)
            .cloned()
            .unwrap_or_else(|| Outcome::Success(output_for(job_type)));

        match outcome {
            Outcome::Success(output) => {
                if job_type == JobType::Projection {
                    self.store.write_statistics(ticket, &output.to_string())?;
                } else {
                    self.store.write_response(job_type, ticket, &output.to_string())?;
                }
                self.store.write_progress(ticket, 50)?;
                self.store.finish(ticket, progress::COMPLETE)?;
            }
            Outcome::Failed(code) => {
                self.store.finish(ticket, code)?;
            }
        }
        self.executed.lock().unwrap().push(ticket.clone());
        Ok(())
    }

    /// Take, finish, and report one job.
    pub fn run(&self, ticket: &Ticket, job_type: JobType) -> Result<Option<SchedulerStep>> {
        if !self.take(ticket, job_type)? {
            return Ok(None);
        }
        self.finish(ticket, job_type)?;
        self.scheduler.on_job_completed(ticket).map(Some)
    }

    /// Keep running whatever is runnable until nothing is. Returns the
    /// tickets run, in order.
    pub fn run_until_idle(&self) -> Result<Vec<Ticket>> {
        let mut ran = Vec::new();
        loop {
            let batch = self.runnable();
            if batch.is_empty() {
                return Ok(ran);
            }
            for (ticket, job_type) in batch {
                if self.run(&ticket, job_type)?.is_some() {
                    ran.push(ticket);
                }
            }
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
