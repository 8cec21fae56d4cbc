// src/server/mod.rs

//! The concurrent request server.
//!
//! [`runtime`] owns the socket and the worker slots, [`protocol`] the
//! messages, [`service`] turns requests into ticket-directory operations and
//! [`experiment`] handles multi-job submissions.

pub mod experiment;
pub mod protocol;
pub mod runtime;
pub mod service;

pub use protocol::{FaultCode, Request, Response};
pub use runtime::Server;
pub use service::JobService;
