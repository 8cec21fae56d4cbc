// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::ServiceStatus;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [store]
/// ticket_directory = "tickets"
/// ticket_attempts = 100
///
/// [server]
/// address = "127.0.0.1:8085"
/// workers = 8
/// status = "available"
/// max_request_bytes = 4194304
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    pub store: StoreSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Validated configuration. Obtain one through
/// [`crate::config::loader::load_and_validate`] or `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub server: ServerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(store: StoreSection, server: ServerSection) -> Self {
        Self { store, server }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Directory holding every ticket's files.
    pub ticket_directory: PathBuf,

    /// How many random tickets to try before giving up on a collision.
    #[serde(default = "default_ticket_attempts")]
    pub ticket_attempts: usize,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_address")]
    pub address: String,

    /// Number of requests served concurrently. `1` serves sequentially.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub status: ServiceStatus,

    /// Longest request line a client may send.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_ticket_attempts() -> usize {
    100
}

fn default_address() -> String {
    "127.0.0.1:8085".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_max_request_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            workers: default_workers(),
            status: ServiceStatus::default(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}
