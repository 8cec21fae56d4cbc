// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs` holds the TOML data model.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` turns a raw config into a validated [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, ServerSection, StoreSection};
