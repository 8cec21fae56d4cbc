// src/fs/mock.rs

use super::{FileLock, FileSystem};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory ticket directory for tests.
///
/// Locks are real in-process mutexes, so concurrency tests against the mock
/// still exercise mutual exclusion. Individual paths can be marked
/// unreadable to inject failures into the middle of a scheduler run.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
    unreadable: Arc<Mutex<HashSet<PathBuf>>>,
    failing_writes: Arc<Mutex<Vec<String>>>,
}

fn not_found(path: &Path) -> anyhow::Error {
    anyhow::Error::new(io::Error::new(
        io::ErrorKind::NotFound,
        format!("File not found: {:?}", path),
    ))
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Make every subsequent read of `path` fail, even if the file exists.
    pub fn set_unreadable(&self, path: impl AsRef<Path>) {
        self.unreadable.lock().insert(path.as_ref().to_path_buf());
    }

    /// Make whole-file writes fail for every file whose name starts with
    /// `prefix`.
    pub fn fail_writes_with_prefix(&self, prefix: &str) {
        self.failing_writes.lock().push(prefix.to_string());
    }

    /// Snapshot of all file names currently stored, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        if self.unreadable.lock().contains(path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        let files = self.files.lock();
        match files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing_writes.lock().iter().any(|p| name.starts_with(p.as_str())) {
            return Err(anyhow!("No space left on device: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(contents);
        Ok(())
    }

    fn create_new(&self, path: &Path) -> Result<bool> {
        let mut files = self.files.lock();
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(path.to_path_buf(), Vec::new());
        Ok(true)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.lock();
        match files.remove(from) {
            Some(content) => {
                files.insert(to.to_path_buf(), content);
                Ok(())
            }
            None => Err(not_found(from)),
        }
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        if !self.exists(path) {
            return Err(not_found(path));
        }
        let mutex = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let guard = mutex.lock_arc();
        Ok(FileLock::new(path, guard))
    }
}
