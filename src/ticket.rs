// src/ticket.rs

//! Tickets and the ticket issuer.
//!
//! A ticket is created by atomically creating the raw ticket file
//! `<dir>/<ticket>`; that file is later the experiment lock target and the
//! append-only job log.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{OmwsError, Result};
use crate::store::{JobMetadata, TicketStore};
use crate::types::JobType;

/// Number of characters in a ticket (mkstemp's `XXXXXX`).
pub const TICKET_LEN: usize = 6;

/// Opaque identifier of one job or experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticket(String);

impl Ticket {
    /// Validate a ticket received from outside (RPC, metadata files, CLI).
    pub fn parse(s: &str) -> std::result::Result<Ticket, String> {
        let s = s.trim();
        if s.len() != TICKET_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(format!("invalid ticket: {s:?}"));
        }
        Ok(Ticket(s.to_string()))
    }

    fn random() -> Ticket {
        let s: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TICKET_LEN)
            .map(char::from)
            .collect();
        Ticket(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ticket::parse(s)
    }
}

impl TryFrom<String> for Ticket {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ticket::parse(&s)
    }
}

impl From<Ticket> for String {
    fn from(t: Ticket) -> Self {
        t.0
    }
}

/// Issues fresh tickets and creates their initial files.
#[derive(Debug)]
pub struct TicketIssuer<'a> {
    store: &'a TicketStore,
    attempts: usize,
}

impl<'a> TicketIssuer<'a> {
    pub fn new(store: &'a TicketStore, attempts: usize) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
        }
    }

    /// Create a new ticket of the given type.
    ///
    /// On success the raw ticket file and `job.<ticket>` (with `TYPE`) exist.
    /// On failure neither does.
    pub fn issue(&self, job_type: JobType) -> Result<Ticket> {
        let ticket = self.reserve()?;

        let meta = JobMetadata::new(job_type);
        if let Err(e) = self.store.write_metadata(&ticket, &meta) {
            warn!(ticket = %ticket, error = %e, "metadata write failed; removing ticket file");
            if let Err(cleanup) = self.store.discard(&ticket, job_type) {
                warn!(ticket = %ticket, error = %cleanup, "could not remove partial ticket");
            }
            return Err(OmwsError::CreateTicketFailed(e.to_string()));
        }

        info!(ticket = %ticket, job_type = %job_type, "ticket issued");
        Ok(ticket)
    }

    fn reserve(&self) -> Result<Ticket> {
        for attempt in 1..=self.attempts {
            let candidate = Ticket::random();
            match self.store.create_ticket_file(&candidate) {
                Ok(true) => return Ok(candidate),
                Ok(false) => {
                    debug!(ticket = %candidate, attempt, "ticket collision; retrying");
                }
                Err(e) => return Err(OmwsError::CreateTicketFailed(e.to_string())),
            }
        }
        Err(OmwsError::CreateTicketFailed(format!(
            "no free ticket after {} attempts",
            self.attempts
        )))
    }
}
