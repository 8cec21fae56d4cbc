// src/server/experiment.rs

//! Experiment submission.
//!
//! The plan is validated before anything is written. Files are then created
//! in an order that keeps the Job Executor out until the very end: every
//! member starts as `_pend`, and only the roots are promoted to `_req` once
//! all metadata is in place. A failure on the way removes every ticket that
//! was created.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::dag::{ExperimentGraph, ExperimentPlan};
use crate::errors::{OmwsError, Result};
use crate::server::protocol::Submission;
use crate::store::{Dependency, JobMetadata, Stage, TicketStore};
use crate::ticket::{Ticket, TicketIssuer};
use crate::types::JobType;

pub fn submit_experiment(
    store: &TicketStore,
    ticket_attempts: usize,
    plan: &ExperimentPlan,
    raw: &Value,
) -> Result<Submission> {
    let graph = ExperimentGraph::build(plan)?;

    let mut created: Vec<(Ticket, JobType)> = Vec::new();
    match materialize(store, ticket_attempts, plan, &graph, raw, &mut created) {
        Ok(submission) => {
            info!(
                experiment = %submission.ticket,
                jobs = submission.jobs.len(),
                "experiment submitted"
            );
            Ok(submission)
        }
        Err(e) => {
            warn!(error = %e, created = created.len(), "experiment submission failed; rolling back");
            for (ticket, job_type) in created.iter().rev() {
                if let Err(cleanup) = store.discard(ticket, *job_type) {
                    warn!(ticket = %ticket, error = %cleanup, "rollback incomplete");
                }
            }
            Err(e)
        }
    }
}

fn materialize(
    store: &TicketStore,
    ticket_attempts: usize,
    plan: &ExperimentPlan,
    graph: &ExperimentGraph,
    raw: &Value,
    created: &mut Vec<(Ticket, JobType)>,
) -> Result<Submission> {
    let issuer = TicketIssuer::new(store, ticket_attempts);

    let experiment = issuer.issue(JobType::Experiment)?;
    created.push((experiment.clone(), JobType::Experiment));
    store.write_payload(
        JobType::Experiment,
        Stage::Pending,
        &experiment,
        &serde_json::to_string_pretty(raw)?,
    )?;

    let mut tickets: BTreeMap<String, Ticket> = BTreeMap::new();
    for job in &plan.jobs {
        let ticket = issuer.issue(job.job_type)?;
        created.push((ticket.clone(), job.job_type));
        store.write_payload(
            job.job_type,
            Stage::Pending,
            &ticket,
            &serde_json::to_string_pretty(&job.parameters)?,
        )?;
        tickets.insert(job.id.clone(), ticket);
    }

    let lookup = |id: &str| -> Result<Ticket> {
        tickets
            .get(id)
            .cloned()
            .ok_or_else(|| OmwsError::InvalidRequest(format!("unknown job id '{id}'")))
    };

    let mut exp_meta = JobMetadata::new(JobType::Experiment);
    for job in &plan.jobs {
        let ticket = lookup(&job.id)?;
        let mut meta = JobMetadata::new(job.job_type);
        meta.experiment = Some(experiment.clone());
        for (dep_id, role) in &job.depends_on {
            meta.prev.push(Dependency::new(role.clone(), lookup(dep_id)?));
        }
        for dependent in graph.dependents_of(&job.id) {
            meta.next.push(lookup(dependent)?);
        }
        store.write_metadata(&ticket, &meta)?;

        exp_meta.jobs.push(ticket);
        exp_meta.ids.push(job.id.clone());
    }
    store.write_metadata(&experiment, &exp_meta)?;

    if !store.promote(JobType::Experiment, &experiment, Stage::Pending, Stage::Processed)? {
        return Err(OmwsError::CreateTicketFailed(format!(
            "experiment payload of {experiment} vanished"
        )));
    }

    for job in plan.jobs.iter().filter(|j| j.depends_on.is_empty()) {
        let ticket = lookup(&job.id)?;
        if !store.promote_pending_to_request(job.job_type, &ticket)? {
            return Err(OmwsError::CreateTicketFailed(format!(
                "pending request of {ticket} vanished"
            )));
        }
    }

    Ok(Submission {
        ticket: experiment,
        jobs: tickets,
    })
}
