// src/store/progress.rs

//! Progress codes and the client-facing progress view.

use tracing::debug;

use super::TicketStore;
use crate::errors::Result;
use crate::ticket::Ticket;
use crate::types::JobType;

/// Waiting for dependencies or for the executor.
pub const QUEUED: i32 = -1;
/// Failed inside the Job Executor.
pub const ABORTED: i32 = -2;
/// Cancelled, and the terminal failure code of an experiment.
pub const CANCELLED: i32 = -3;
/// The ticket does not exist.
pub const UNKNOWN_TICKET: i32 = -4;
pub const COMPLETE: i32 = 100;

/// Parse the contents of a `prog.` file. Empty means 0.
pub fn parse_progress(text: &str) -> std::result::Result<i32, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse::<i32>()
        .map_err(|e| format!("invalid progress value {text:?}: {e}"))
}

/// Combine member progress into an experiment figure.
///
/// Any failure code (below `QUEUED`) wins; all-queued stays queued;
/// otherwise the mean over all members, counting queued ones as zero.
pub fn aggregate(members: &[i32]) -> i32 {
    if members.is_empty() {
        return QUEUED;
    }
    if let Some(code) = members.iter().copied().find(|&c| c < QUEUED) {
        return code;
    }
    if members.iter().all(|&c| c == QUEUED) {
        return QUEUED;
    }
    let sum: i64 = members.iter().map(|&c| i64::from(c.max(0))).sum();
    (sum / members.len() as i64) as i32
}

impl TicketStore {
    /// Progress as reported to clients by `getProgress`.
    ///
    /// Unlike [`TicketStore::read_progress`] this never fails on a missing
    /// ticket: an unknown ticket is `UNKNOWN_TICKET`, and a job whose
    /// progress says 100 before its done sentinel exists reports 99.
    pub fn job_progress(&self, ticket: &Ticket) -> Result<i32> {
        if !self.ticket_exists(ticket) {
            return Ok(UNKNOWN_TICKET);
        }

        if !self.has_progress(ticket) {
            let members = match self.read_metadata(ticket) {
                Ok(meta) if meta.job_type == JobType::Experiment => meta.jobs,
                _ => Vec::new(),
            };
            if members.is_empty() {
                return Ok(QUEUED);
            }
            let mut codes = Vec::with_capacity(members.len());
            for member in &members {
                codes.push(self.member_progress(member)?);
            }
            let overall = aggregate(&codes);
            debug!(ticket = %ticket, members = codes.len(), overall, "aggregated experiment progress");
            return Ok(overall);
        }

        self.member_progress(ticket)
    }

    fn member_progress(&self, ticket: &Ticket) -> Result<i32> {
        if !self.ticket_exists(ticket) {
            return Ok(UNKNOWN_TICKET);
        }
        let code = self.read_progress(ticket)?;
        if code == COMPLETE && !self.is_done(ticket) {
            return Ok(COMPLETE - 1);
        }
        Ok(code)
    }
}
