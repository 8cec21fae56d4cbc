// src/store/paths.rs

//! File naming for the ticket directory: `<prefix><ticket>`.

use crate::ticket::Ticket;
use crate::types::JobType;

/// Lifecycle stage of a job's input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Template captured at submission; dependencies unresolved.
    Pending,
    /// Ready for the Job Executor.
    Request,
    /// Consumed by the executor (or cancelled before running).
    Processed,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Pending, Stage::Request, Stage::Processed];

    pub fn suffix(self) -> &'static str {
        match self {
            Stage::Pending => "pend",
            Stage::Request => "req",
            Stage::Processed => "proc",
        }
    }
}

/// One file family of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// The raw ticket file: lock target and append-only log.
    Ticket,
    Metadata,
    Progress,
    Done,
    Payload(JobType, Stage),
    Response(JobType),
    Statistics,
}

impl FileKind {
    pub fn prefix(self) -> String {
        match self {
            FileKind::Ticket => String::new(),
            FileKind::Metadata => "job.".to_string(),
            FileKind::Progress => "prog.".to_string(),
            FileKind::Done => "done.".to_string(),
            FileKind::Payload(t, stage) => format!("{}_{}.", t.tag(), stage.suffix()),
            FileKind::Response(t) => format!("{}_resp.", t.tag()),
            FileKind::Statistics => "stats.".to_string(),
        }
    }

    pub fn file_name(self, ticket: &Ticket) -> String {
        format!("{}{}", self.prefix(), ticket)
    }
}
