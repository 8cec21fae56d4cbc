// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OmwsError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OmwsError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.store, raw.server))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_store(cfg)?;
    validate_server(cfg)?;
    Ok(())
}

fn validate_store(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.ticket_directory.as_os_str().is_empty() {
        return Err(OmwsError::ConfigError(
            "[store].ticket_directory must not be empty".to_string(),
        ));
    }
    if cfg.store.ticket_attempts == 0 {
        return Err(OmwsError::ConfigError(
            "[store].ticket_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.workers == 0 {
        return Err(OmwsError::ConfigError(
            "[server].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.server.max_request_bytes == 0 {
        return Err(OmwsError::ConfigError(
            "[server].max_request_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.server.address.parse::<SocketAddr>().is_err() {
        return Err(OmwsError::ConfigError(format!(
            "[server].address '{}' is not a valid socket address",
            cfg.server.address
        )));
    }
    Ok(())
}
