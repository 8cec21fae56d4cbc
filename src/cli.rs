// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `omws`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "omws",
    version,
    about = "Ticket-based job and experiment orchestration service.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `OMWS_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the request server.
    Serve {
        /// Path to the config file (TOML).
        #[arg(long, value_name = "PATH", default_value = "Omws.toml")]
        config: String,

        /// Listen address; overrides `[server].address`.
        #[arg(long, value_name = "HOST:PORT")]
        address: Option<String>,

        /// Worker slots; overrides `[server].workers`.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Validate the config and print the effective settings, then exit.
        #[arg(long)]
        dry_run: bool,
    },

    /// Completion hook for the Job Executor: advance the experiment that
    /// owns `ticket`.
    Complete {
        #[arg(long, value_name = "TICKET")]
        ticket: String,

        #[arg(long, value_name = "PATH", default_value = "Omws.toml")]
        config: String,

        /// Write ready successors to `_proc` instead of `_req` (for
        /// executors that dispatch jobs themselves, e.g. HTCondor).
        #[arg(long)]
        skip_request: bool,

        /// Write `done.<ticket>` for the finished job before scheduling.
        #[arg(long)]
        create_done: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
