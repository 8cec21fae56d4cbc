// src/server/service.rs

//! Operation adapters behind the request server.
//!
//! Every method here is synchronous and touches only the ticket directory;
//! none of them waits for the Job Executor. The async runtime calls them on
//! the blocking pool.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::Canceller;
use crate::errors::{OmwsError, Result};
use crate::lock::with_experiment_lock;
use crate::server::experiment::submit_experiment;
use crate::server::protocol::{self, JobResult, Request, Response, Submission, TicketProgress};
use crate::store::{Stage, TicketStore, progress};
use crate::ticket::{Ticket, TicketIssuer};
use crate::types::{JobType, ServiceStatus};

#[derive(Debug, Clone)]
pub struct JobService {
    store: TicketStore,
    canceller: Canceller,
    status: ServiceStatus,
    ticket_attempts: usize,
}

impl JobService {
    pub fn new(store: TicketStore, status: ServiceStatus, ticket_attempts: usize) -> Self {
        let canceller = Canceller::new(store.clone());
        Self {
            store,
            canceller,
            status,
            ticket_attempts,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let store = TicketStore::open(&cfg.store.ticket_directory)?;
        Ok(Self::new(store, cfg.server.status, cfg.store.ticket_attempts))
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Execute one request. Errors become fault responses.
    pub fn dispatch(&self, request: Request) -> Response {
        let op = request.op();
        if self.status == ServiceStatus::Unavailable && request != Request::Ping {
            debug!(op, "rejecting request: service unavailable");
            return OmwsError::ServiceUnavailable.into();
        }

        let outcome = match request {
            Request::Ping => Ok(Response::Pong {
                status: self.ping(),
            }),
            Request::Submit { job_type, payload } => {
                self.submit(job_type, &payload).map(Response::Submitted)
            }
            Request::Progress { tickets } => self
                .progress(&tickets)
                .map(|progress| Response::Progress { progress }),
            Request::Log { ticket } => self.log(&ticket).map(|(ticket, log)| Response::Log { ticket, log }),
            Request::Result { ticket } => self
                .result(&ticket)
                .map(|results| Response::Results { results }),
            Request::Cancel { tickets } => self
                .cancel(&tickets)
                .map(|tickets| Response::Cancelled { tickets }),
        };

        match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(op, error = %e, "request failed");
                e.into()
            }
        }
    }

    pub fn ping(&self) -> ServiceStatus {
        self.status
    }

    /// Submit a job. Experiments are expanded into their member jobs.
    pub fn submit(&self, job_type: JobType, payload: &Value) -> Result<Submission> {
        if job_type == JobType::Experiment {
            let plan = protocol::experiment_plan(payload)?;
            return submit_experiment(&self.store, self.ticket_attempts, &plan, payload);
        }

        let issuer = TicketIssuer::new(&self.store, self.ticket_attempts);
        let ticket = issuer.issue(job_type)?;

        let written = serde_json::to_string_pretty(payload)
            .map_err(OmwsError::from)
            .and_then(|text| self.store.write_payload(job_type, Stage::Pending, &ticket, &text))
            .and_then(|()| self.store.promote_pending_to_request(job_type, &ticket));
        let failure = match written {
            Ok(true) => None,
            Ok(false) => Some("pending request vanished".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            warn!(ticket = %ticket, error = %reason, "submission failed; rolling back");
            if let Err(e) = self.store.discard(&ticket, job_type) {
                warn!(ticket = %ticket, error = %e, "rollback incomplete");
            }
            return Err(OmwsError::CreateTicketFailed(reason));
        }

        info!(ticket = %ticket, job_type = %job_type, "job submitted");
        Ok(Submission {
            ticket,
            jobs: Default::default(),
        })
    }

    /// Progress for each requested ticket, in request order.
    ///
    /// Malformed or unknown tickets are reported as `-4`.
    pub fn progress(&self, tickets: &[String]) -> Result<Vec<TicketProgress>> {
        tickets
            .iter()
            .map(|raw| -> Result<TicketProgress> {
                let progress = match Ticket::parse(raw) {
                    Ok(ticket) => self.store.job_progress(&ticket)?,
                    Err(_) => progress::UNKNOWN_TICKET,
                };
                Ok(TicketProgress {
                    ticket: raw.clone(),
                    progress,
                })
            })
            .collect()
    }

    pub fn log(&self, raw: &str) -> Result<(Ticket, String)> {
        let ticket = known_ticket(raw)?;
        let log = self.store.read_log(&ticket)?;
        Ok((ticket, log))
    }

    /// Outputs of a finished job, or of every finished member of an
    /// experiment.
    pub fn result(&self, raw: &str) -> Result<Vec<JobResult>> {
        let ticket = known_ticket(raw)?;
        let meta = self.store.read_metadata(&ticket)?;

        let members = if meta.is_experiment() {
            meta.jobs
        } else {
            vec![ticket]
        };

        let mut results = Vec::new();
        for member in members {
            if self.store.job_progress(&member)? != progress::COMPLETE {
                continue;
            }
            let job_type = self.store.read_metadata(&member)?.job_type;
            if let Some(text) = self.store.read_result(job_type, &member)? {
                let output = serde_json::from_str(&text).unwrap_or(Value::String(text));
                results.push(JobResult {
                    ticket: member,
                    job_type,
                    output,
                });
            }
        }

        if results.is_empty() {
            return Err(OmwsError::NoResults);
        }
        Ok(results)
    }

    /// Cancel the given tickets. Returns those that this call cancelled.
    ///
    /// Cancelling a queued member of an experiment stops the whole
    /// experiment, which could never complete without it.
    pub fn cancel(&self, tickets: &[String]) -> Result<Vec<Ticket>> {
        let mut cancelled = Vec::new();
        for raw in tickets {
            let ticket = match Ticket::parse(raw) {
                Ok(t) if self.store.ticket_exists(&t) => t,
                _ => {
                    debug!(ticket = %raw, "cancel: unknown ticket");
                    continue;
                }
            };
            if self.cancel_one(&ticket)? {
                cancelled.push(ticket);
            }
        }
        Ok(cancelled)
    }

    fn cancel_one(&self, ticket: &Ticket) -> Result<bool> {
        let meta = self.store.read_metadata(ticket)?;
        let owner = meta.lock_owner(ticket).unwrap_or(ticket).clone();

        with_experiment_lock(&self.store, &owner, || {
            let retired = self.canceller.cancel_job(ticket)?;
            if retired && !meta.is_experiment() {
                if let Some(exp) = &meta.experiment {
                    self.canceller.stop_experiment(exp, Some(ticket))?;
                }
            }
            Ok(retired)
        })
    }
}

/// Malformed tickets can never exist in the store.
fn known_ticket(raw: &str) -> Result<Ticket> {
    Ticket::parse(raw).map_err(|_| OmwsError::UnknownTicket(raw.to_string()))
}
