// src/server/protocol.rs

//! Request and response messages.
//!
//! On the wire each message is one line of JSON. Requests are tagged by
//! `op`, responses by `kind`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::ExperimentPlan;
use crate::errors::OmwsError;
use crate::ticket::Ticket;
use crate::types::{JobType, ServiceStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Ping,
    /// Submit a single job, or an experiment when `type` is `experiment`.
    Submit {
        #[serde(rename = "type")]
        job_type: JobType,
        #[serde(default)]
        payload: Value,
    },
    Progress {
        tickets: Vec<String>,
    },
    Log {
        ticket: String,
    },
    Result {
        ticket: String,
    },
    Cancel {
        tickets: Vec<String>,
    },
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Submit { .. } => "submit",
            Request::Progress { .. } => "progress",
            Request::Log { .. } => "log",
            Request::Result { .. } => "result",
            Request::Cancel { .. } => "cancel",
        }
    }
}

/// Per-ticket progress entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketProgress {
    pub ticket: String,
    pub progress: i32,
}

/// Output of one finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub ticket: Ticket,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub output: Value,
}

/// Receipt of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub ticket: Ticket,
    /// For experiments: client job id → member ticket.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jobs: BTreeMap<String, Ticket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    UnknownTicket,
    ServiceUnavailable,
    InvalidRequest,
    NoResults,
    Transport,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response {
    Pong {
        status: ServiceStatus,
    },
    Submitted(Submission),
    Progress {
        progress: Vec<TicketProgress>,
    },
    Log {
        ticket: Ticket,
        log: String,
    },
    Results {
        results: Vec<JobResult>,
    },
    Cancelled {
        tickets: Vec<Ticket>,
    },
    Fault {
        code: FaultCode,
        message: String,
    },
}

impl Response {
    pub fn fault(code: FaultCode, message: impl Into<String>) -> Self {
        Response::Fault {
            code,
            message: message.into(),
        }
    }
}

impl From<&OmwsError> for FaultCode {
    fn from(err: &OmwsError) -> Self {
        match err {
            OmwsError::UnknownTicket(_) => FaultCode::UnknownTicket,
            OmwsError::ServiceUnavailable => FaultCode::ServiceUnavailable,
            OmwsError::InvalidRequest(_) | OmwsError::DagCycle(_) | OmwsError::JsonError(_) => {
                FaultCode::InvalidRequest
            }
            OmwsError::NoResults => FaultCode::NoResults,
            _ => FaultCode::Internal,
        }
    }
}

impl From<OmwsError> for Response {
    fn from(err: OmwsError) -> Self {
        Response::fault(FaultCode::from(&err), err.to_string())
    }
}

/// Decode the experiment plan carried in a submit payload.
pub fn experiment_plan(payload: &Value) -> Result<ExperimentPlan, OmwsError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| OmwsError::InvalidRequest(format!("malformed experiment plan: {e}")))
}
