// src/store/mod.rs

//! The State Store: typed access to the ticket directory.
//!
//! There is no cache. Every call goes back to the files, so any number of
//! processes can share one directory. Payload stages move forward only by
//! atomic rename (see [`TicketStore::promote`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::{OmwsError, Result};
use crate::fs::{FileLock, FileSystem, RealFileSystem, is_not_found};
use crate::ticket::Ticket;
use crate::types::JobType;

pub mod metadata;
pub mod paths;
pub mod progress;

pub use metadata::{Dependency, JobMetadata};
pub use paths::{FileKind, Stage};

#[derive(Debug, Clone)]
pub struct TicketStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl TicketStore {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    /// Open a ticket directory on the real filesystem, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self::new(dir, Arc::new(RealFileSystem)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: FileKind, ticket: &Ticket) -> PathBuf {
        self.dir.join(kind.file_name(ticket))
    }

    pub fn exists(&self, kind: FileKind, ticket: &Ticket) -> bool {
        self.fs.exists(&self.path(kind, ticket))
    }

    pub fn ticket_exists(&self, ticket: &Ticket) -> bool {
        self.exists(FileKind::Ticket, ticket)
    }

    /// Atomically create the raw ticket file. `false` if it already exists.
    pub fn create_ticket_file(&self, ticket: &Ticket) -> Result<bool> {
        Ok(self.fs.create_new(&self.path(FileKind::Ticket, ticket))?)
    }

    fn read(&self, kind: FileKind, ticket: &Ticket) -> Result<String> {
        let path = self.path(kind, ticket);
        trace!(path = ?path, "read");
        Ok(self.fs.read_to_string(&path)?)
    }

    fn write(&self, kind: FileKind, ticket: &Ticket, contents: &str) -> Result<()> {
        let path = self.path(kind, ticket);
        trace!(path = ?path, bytes = contents.len(), "write");
        Ok(self.fs.write(&path, contents.as_bytes())?)
    }

    fn corrupt(&self, kind: FileKind, ticket: &Ticket, reason: String) -> OmwsError {
        OmwsError::CorruptState {
            path: self.path(kind, ticket).display().to_string(),
            reason,
        }
    }

    pub fn has_progress(&self, ticket: &Ticket) -> bool {
        self.exists(FileKind::Progress, ticket)
    }

    /// Current progress code. A missing `prog.` file reads as queued.
    pub fn read_progress(&self, ticket: &Ticket) -> Result<i32> {
        let text = match self.fs.read_to_string(&self.path(FileKind::Progress, ticket)) {
            Ok(text) => text,
            Err(e) if is_not_found(&e) => return Ok(progress::QUEUED),
            Err(e) => return Err(e.into()),
        };
        progress::parse_progress(&text).map_err(|reason| self.corrupt(FileKind::Progress, ticket, reason))
    }

    pub fn write_progress(&self, ticket: &Ticket, code: i32) -> Result<()> {
        debug!(ticket = %ticket, code, "progress");
        self.write(FileKind::Progress, ticket, &code.to_string())
    }

    pub fn mark_done(&self, ticket: &Ticket) -> Result<()> {
        debug!(ticket = %ticket, "done");
        self.write(FileKind::Done, ticket, "")
    }

    pub fn is_done(&self, ticket: &Ticket) -> bool {
        self.exists(FileKind::Done, ticket)
    }

    /// Write the terminal `code` and then the done sentinel, in that order.
    pub fn finish(&self, ticket: &Ticket, code: i32) -> Result<()> {
        self.write_progress(ticket, code)?;
        self.mark_done(ticket)
    }

    pub fn read_metadata(&self, ticket: &Ticket) -> Result<JobMetadata> {
        let text = match self.read(FileKind::Metadata, ticket) {
            Ok(text) => text,
            Err(OmwsError::Other(e)) if is_not_found(&e) => {
                return Err(OmwsError::UnknownTicket(ticket.to_string()));
            }
            Err(e) => return Err(e),
        };
        JobMetadata::parse(&text).map_err(|reason| self.corrupt(FileKind::Metadata, ticket, reason))
    }

    pub fn write_metadata(&self, ticket: &Ticket, meta: &JobMetadata) -> Result<()> {
        self.write(FileKind::Metadata, ticket, &meta.render())
    }

    pub fn read_payload(&self, job_type: JobType, stage: Stage, ticket: &Ticket) -> Result<String> {
        self.read(FileKind::Payload(job_type, stage), ticket)
    }

    pub fn write_payload(
        &self,
        job_type: JobType,
        stage: Stage,
        ticket: &Ticket,
        contents: &str,
    ) -> Result<()> {
        self.write(FileKind::Payload(job_type, stage), ticket, contents)
    }

    /// The stage the payload currently sits in, if any payload exists.
    pub fn payload_stage(&self, job_type: JobType, ticket: &Ticket) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|&stage| self.exists(FileKind::Payload(job_type, stage), ticket))
    }

    /// Move a payload from one stage to another by atomic rename.
    ///
    /// Returns `false` when the source file is gone, which means somebody else
    /// (the executor, or a concurrent cancel) already moved it.
    pub fn promote(&self, job_type: JobType, ticket: &Ticket, from: Stage, to: Stage) -> Result<bool> {
        let src = self.path(FileKind::Payload(job_type, from), ticket);
        let dst = self.path(FileKind::Payload(job_type, to), ticket);
        match self.fs.rename(&src, &dst) {
            Ok(()) => {
                debug!(ticket = %ticket, from = from.suffix(), to = to.suffix(), "promoted");
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn promote_pending_to_request(&self, job_type: JobType, ticket: &Ticket) -> Result<bool> {
        self.promote(job_type, ticket, Stage::Pending, Stage::Request)
    }

    pub fn promote_request_to_processed(&self, job_type: JobType, ticket: &Ticket) -> Result<bool> {
        self.promote(job_type, ticket, Stage::Request, Stage::Processed)
    }

    /// Output of a finished job. Projections publish `stats.`, the rest
    /// `<type>_resp.`. `None` when the output file does not exist.
    pub fn read_result(&self, job_type: JobType, ticket: &Ticket) -> Result<Option<String>> {
        let kind = match job_type {
            JobType::Projection => FileKind::Statistics,
            other => FileKind::Response(other),
        };
        match self.read(kind, ticket) {
            Ok(text) => Ok(Some(text)),
            Err(OmwsError::Other(e)) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write_response(&self, job_type: JobType, ticket: &Ticket, contents: &str) -> Result<()> {
        self.write(FileKind::Response(job_type), ticket, contents)
    }

    pub fn write_statistics(&self, ticket: &Ticket, contents: &str) -> Result<()> {
        self.write(FileKind::Statistics, ticket, contents)
    }

    /// Append one line to the ticket's log (the raw ticket file).
    pub fn append_log(&self, ticket: &Ticket, line: &str) -> Result<()> {
        let mut text = line.trim_end().to_string();
        text.push('\n');
        Ok(self.fs.append(&self.path(FileKind::Ticket, ticket), text.as_bytes())?)
    }

    pub fn read_log(&self, ticket: &Ticket) -> Result<String> {
        match self.read(FileKind::Ticket, ticket) {
            Err(OmwsError::Other(e)) if is_not_found(&e) => {
                Err(OmwsError::UnknownTicket(ticket.to_string()))
            }
            other => other,
        }
    }

    /// Blocking exclusive lock on the raw ticket file.
    pub fn lock(&self, ticket: &Ticket) -> Result<FileLock> {
        match self.fs.lock_exclusive(&self.path(FileKind::Ticket, ticket)) {
            Ok(lock) => Ok(lock),
            Err(e) if is_not_found(&e) => Err(OmwsError::UnknownTicket(ticket.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every file a ticket of `job_type` can own. Used to roll back a
    /// submission that failed half way.
    pub fn discard(&self, ticket: &Ticket, job_type: JobType) -> Result<()> {
        let mut kinds = vec![
            FileKind::Metadata,
            FileKind::Progress,
            FileKind::Done,
            FileKind::Response(job_type),
            FileKind::Statistics,
        ];
        kinds.extend(Stage::ALL.map(|s| FileKind::Payload(job_type, s)));
        for kind in kinds {
            self.fs.remove(&self.path(kind, ticket))?;
        }
        // Last, so the ticket cannot be reissued while its files linger.
        self.fs.remove(&self.path(FileKind::Ticket, ticket))?;
        debug!(ticket = %ticket, "discarded");
        Ok(())
    }
}
