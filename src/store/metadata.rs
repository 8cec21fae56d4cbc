// src/store/metadata.rs

//! The `job.<ticket>` metadata file.
//!
//! Stored as `KEY=value` lines. Dependency edges are written as
//! `<role>_<ticket>` and parsed into [`Dependency`] here; nothing else in
//! the crate sees the string encoding.

use std::collections::BTreeMap;

use crate::ticket::Ticket;
use crate::types::{JobType, Role};

const KEY_TYPE: &str = "TYPE";
const KEY_EXP: &str = "EXP";
const KEY_PREV: &str = "PREV";
const KEY_NEXT: &str = "NEXT";
const KEY_JOBS: &str = "JOBS";
const KEY_IDS: &str = "IDS";

/// A role-tagged dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub role: Role,
    pub ticket: Ticket,
}

impl Dependency {
    pub fn new(role: impl Into<Role>, ticket: Ticket) -> Self {
        Self {
            role: role.into(),
            ticket,
        }
    }

    fn parse_edge(edge: &str) -> Result<Self, String> {
        // Tickets are alphanumeric, so the last '_' always splits role from ticket.
        let (role, ticket) = edge
            .rsplit_once('_')
            .ok_or_else(|| format!("dependency edge without role: {edge:?}"))?;
        if role.is_empty() {
            return Err(format!("dependency edge without role: {edge:?}"));
        }
        Ok(Self {
            role: Role::from(role),
            ticket: Ticket::parse(ticket)?,
        })
    }

    fn to_edge(&self) -> String {
        format!("{}_{}", self.role, self.ticket)
    }
}

/// Parsed contents of `job.<ticket>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetadata {
    pub job_type: JobType,
    /// Owning experiment, for member jobs.
    pub experiment: Option<Ticket>,
    pub prev: Vec<Dependency>,
    pub next: Vec<Ticket>,
    /// Member tickets (experiments only).
    pub jobs: Vec<Ticket>,
    /// Client-side job ids, parallel to `jobs`.
    pub ids: Vec<String>,
    /// Keys this version does not interpret. Preserved on rewrite.
    pub extra: BTreeMap<String, String>,
}

impl JobMetadata {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            experiment: None,
            prev: Vec::new(),
            next: Vec::new(),
            jobs: Vec::new(),
            ids: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn is_experiment(&self) -> bool {
        self.job_type == JobType::Experiment
    }

    /// The experiment whose lock protects this job, if any.
    pub fn lock_owner<'a>(&'a self, own: &'a Ticket) -> Option<&'a Ticket> {
        if self.is_experiment() {
            Some(own)
        } else {
            self.experiment.as_ref()
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut job_type = None;
        let mut meta = JobMetadata::new(JobType::Model);

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected KEY=value", lineno + 1))?;
            let value = value.trim();
            match key.trim() {
                KEY_TYPE => {
                    job_type = Some(value.parse::<JobType>()?);
                }
                KEY_EXP => {
                    meta.experiment = if value.is_empty() {
                        None
                    } else {
                        Some(Ticket::parse(value)?)
                    };
                }
                KEY_PREV => {
                    meta.prev = split_list(value)
                        .map(Dependency::parse_edge)
                        .collect::<Result<_, _>>()?;
                }
                KEY_NEXT => meta.next = parse_tickets(value)?,
                KEY_JOBS => meta.jobs = parse_tickets(value)?,
                KEY_IDS => meta.ids = split_list(value).map(str::to_string).collect(),
                other => {
                    meta.extra.insert(other.to_string(), value.to_string());
                }
            }
        }

        meta.job_type = job_type.ok_or_else(|| format!("missing {KEY_TYPE}"))?;
        Ok(meta)
    }

    pub fn render(&self) -> String {
        let mut out = format!("{KEY_TYPE}={}\n", self.job_type);
        if let Some(exp) = &self.experiment {
            out.push_str(&format!("{KEY_EXP}={exp}\n"));
        }
        if !self.prev.is_empty() {
            let edges: Vec<String> = self.prev.iter().map(Dependency::to_edge).collect();
            out.push_str(&format!("{KEY_PREV}={}\n", edges.join(",")));
        }
        if !self.next.is_empty() {
            out.push_str(&format!("{KEY_NEXT}={}\n", join_tickets(&self.next)));
        }
        if !self.jobs.is_empty() {
            out.push_str(&format!("{KEY_JOBS}={}\n", join_tickets(&self.jobs)));
        }
        if !self.ids.is_empty() {
            out.push_str(&format!("{KEY_IDS}={}\n", self.ids.join(",")));
        }
        for (k, v) in &self.extra {
            out.push_str(&format!("{k}={v}\n"));
        }
        out
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_tickets(value: &str) -> Result<Vec<Ticket>, String> {
    split_list(value).map(Ticket::parse).collect()
}

fn join_tickets(tickets: &[Ticket]) -> String {
    tickets
        .iter()
        .map(Ticket::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
