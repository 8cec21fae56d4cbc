// src/fs/mod.rs

//! Backing storage for the ticket directory.
//!
//! Everything the store does goes through [`FileSystem`], so the directory
//! of small files can be swapped for another backend as long as it keeps the
//! two primitives the orchestration relies on: atomic `rename` and an
//! exclusive lock keyed by path.

use std::any::Any;
use std::fmt::{self, Debug};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{FlockArg, flock};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, warn};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace the whole file. Readers see either the old or the new content.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Atomically create an empty file. Returns `false` if it already exists.
    fn create_new(&self, path: &Path) -> Result<bool>;

    fn exists(&self, path: &Path) -> bool;

    /// Atomic rename. A missing source surfaces as `io::ErrorKind::NotFound`.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    /// Block until an exclusive lock on `path` is held.
    ///
    /// The lock is released when the returned guard is dropped.
    fn lock_exclusive(&self, path: &Path) -> Result<FileLock>;
}

/// Whether an error from a [`FileSystem`] call means "no such file".
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    })
}

/// RAII guard for an exclusive lock obtained through [`FileSystem::lock_exclusive`].
pub struct FileLock {
    path: PathBuf,
    _guard: Box<dyn Any>,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, guard: impl Any) -> Self {
        Self {
            path: path.into(),
            _guard: Box::new(guard),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Implementation that uses `std::fs` and `flock(2)`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

/// Holds the descriptor a `flock` was taken on.
///
/// `flock` locks belong to the open file description, so two threads that
/// open the file separately exclude each other just like two processes do.
struct FlockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for FlockGuard {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!(path = ?self.path, error = %e, "failed to release lock; closing descriptor");
        }
    }
}

fn scratch_path(path: &Path) -> PathBuf {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}.tmp"))
}

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = scratch_path(path);
        let res = (|| -> Result<()> {
            let mut file =
                File::create(&tmp).with_context(|| format!("creating file {:?}", tmp))?;
            file.write_all(contents)
                .with_context(|| format!("writing to file {:?}", tmp))?;
            file.sync_all()
                .with_context(|| format!("syncing file {:?}", tmp))?;
            fs::rename(&tmp, path)
                .with_context(|| format!("renaming {:?} to {:?}", tmp, path))?;
            Ok(())
        })();
        if res.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        res
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {:?} for append", path))?;
        file.write_all(contents)
            .with_context(|| format!("appending to file {:?}", path))?;
        Ok(())
    }

    fn create_new(&self, path: &Path) -> Result<bool> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("creating file {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| format!("renaming {:?} to {:?}", from, to))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing file {:?}", path)),
        }
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        let file = File::open(path).with_context(|| format!("opening lock file {:?}", path))?;

        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusive) {
                Ok(()) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(io::Error::from(e))
                        .with_context(|| format!("locking {:?}", path));
                }
            }
        }

        debug!(path = ?path, "exclusive lock acquired");
        Ok(FileLock::new(
            path,
            FlockGuard {
                file,
                path: path.to_path_buf(),
            },
        ))
    }
}
