//! Per-file locks shared between rename transactions and batch fix passes
//!
//! A file targeted by an in-flight rename is locked against batch edits
//! until the transaction commits or aborts, and vice versa. Acquisition is
//! all-or-nothing over a file set, so two renames over disjoint sets
//! proceed concurrently while overlapping ones serialize.

use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Shared lock table. Clones refer to the same table.
#[derive(Debug, Clone, Default)]
pub struct FileLocks {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every file in `files`, or none of them if any is already held.
    pub fn try_lock_all(&self, files: &[PathBuf]) -> Option<LockGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if files.iter().any(|f| held.contains(f)) {
            debug!("lock contention on {} file(s)", files.len());
            return None;
        }
        for file in files {
            held.insert(file.clone());
        }
        Some(LockGuard {
            locks: self.clone(),
            files: files.to_vec(),
        })
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
    }

    fn release(&self, files: &[PathBuf]) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        for file in files {
            held.remove(file);
        }
    }
}

/// Releases its file set when dropped.
#[derive(Debug)]
pub struct LockGuard {
    locks: FileLocks,
    files: Vec<PathBuf>,
}

impl LockGuard {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.files);
    }
}
