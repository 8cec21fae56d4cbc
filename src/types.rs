// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of work a ticket stands for.
///
/// The serde names are the ones clients use on the wire; [`JobType::tag`] is
/// the short form used in state file names (`model_req.<ticket>` etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Model,
    Test,
    Projection,
    Evaluation,
    Sampling,
    Experiment,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Model,
        JobType::Test,
        JobType::Projection,
        JobType::Evaluation,
        JobType::Sampling,
        JobType::Experiment,
    ];

    /// File-name tag for this job type.
    pub fn tag(self) -> &'static str {
        match self {
            JobType::Model => "model",
            JobType::Test => "test",
            JobType::Projection => "proj",
            JobType::Evaluation => "eval",
            JobType::Sampling => "samp",
            JobType::Experiment => "exp",
        }
    }

    pub fn from_tag(tag: &str) -> Option<JobType> {
        JobType::ALL.into_iter().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for JobType {
    type Err = String;

    /// Accepts both the file tag (`proj`) and the long name (`projection`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Some(t) = JobType::from_tag(&s) {
            return Ok(t);
        }
        match s.as_str() {
            "projection" => Ok(JobType::Projection),
            "evaluation" => Ok(JobType::Evaluation),
            "sampling" => Ok(JobType::Sampling),
            "experiment" => Ok(JobType::Experiment),
            other => Err(format!("invalid job type: {other}")),
        }
    }
}

/// Which input slot of a dependent job a dependency's output fills.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Presence points produced by a sampling job.
    Presence,
    /// Absence points produced by a sampling job.
    Absence,
    /// Serialized model produced by a model job.
    Model,
    /// Lowest presence threshold from an evaluation job. Gates only.
    Lpt,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Presence => "presence",
            Role::Absence => "absence",
            Role::Model => "model",
            Role::Lpt => "lpt",
            Role::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "presence" => Role::Presence,
            "absence" => Role::Absence,
            "model" => Role::Model,
            "lpt" => Role::Lpt,
            other => Role::Other(other.to_string()),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::from(s.as_str()))
    }
}

/// Operational status advertised by `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Available,
    Unavailable,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        ServiceStatus::Available
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(ServiceStatus::Available),
            "unavailable" => Ok(ServiceStatus::Unavailable),
            other => Err(format!(
                "invalid service status: {other} (expected \"available\" or \"unavailable\")"
            )),
        }
    }
}
