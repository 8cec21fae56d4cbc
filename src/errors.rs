// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! `UnknownTicket`, `ServiceUnavailable`, `InvalidRequest`, `DagCycle`,
//! `JsonError` and `NoResults` reach RPC callers as faults with their own
//! code. Every other variant aborts the operation that hit it and is
//! reported as an `internal` fault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OmwsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown ticket: {0}")]
    UnknownTicket(String),

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create ticket: {0}")]
    CreateTicketFailed(String),

    #[error("No results")]
    NoResults,

    #[error("Job {0} has no done sentinel yet")]
    NotTerminal(String),

    #[error("Cycle detected in experiment: {0}")]
    DagCycle(String),

    #[error("Corrupt state file {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OmwsError>;
