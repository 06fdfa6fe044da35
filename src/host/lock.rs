//! Locks nomeados do processo e lock consultivo do arquivo de estado,
//! compartilhado entre processos.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fd_lock::{RwLock, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;

use super::LockFactory;
use crate::error::SyncError;

/// Registry of named async mutexes. Every lock taken through the same
/// registry with the same name excludes the others.
#[derive(Debug, Default)]
pub struct NamedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFactory for NamedLocks {
    type Guard = OwnedMutexGuard<()>;

    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Self::Guard, SyncError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| SyncError::LockTimeout {
                name: name.to_string(),
                waited: timeout,
            })
    }
}

/// Exclusive advisory lock on `<state file>.lock`.
///
/// Held from before the snapshot is loaded until after it is written back,
/// so two CLI runs never interleave their read-modify-write of the state.
pub struct SnapshotLock {
    path: PathBuf,
    file: RwLock<File>,
}

impl SnapshotLock {
    pub fn open(state_file: &Path) -> Result<Self, SyncError> {
        let mut name = state_file.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: RwLock::new(file),
        })
    }

    /// Take the lock without waiting; another holder is reported as
    /// [`SyncError::StateLocked`].
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, SyncError> {
        match self.file.try_write() {
            Ok(guard) => Ok(guard),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(SyncError::StateLocked(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
