//! Advisory locks for mutating operations
//!
//! Each mutating operation holds an exclusive `flock` on a lock file under
//! `<home>/locks/<category>/`. Only cooperating hostkeeper processes observe
//! these locks. A lock already held fails fast with `KeeperError::Locked`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::KeeperError;
use crate::models::{Category, Identifier};

/// Lock file name used for backup/restore/prune of a whole category
const BACKUP_LOCK: &str = "backups";

/// An acquired advisory lock, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock one artifact of a category
    pub fn artifact(
        locks_dir: &Path,
        category: &Category,
        identifier: &Identifier,
    ) -> Result<Self, KeeperError> {
        let path = locks_dir
            .join(category.as_str())
            .join(format!("{}.lock", identifier));
        Self::acquire(path, format!("{} artifact '{}'", category, identifier))
    }

    /// Lock the backup scope of a category
    pub fn backups(locks_dir: &Path, category: &Category) -> Result<Self, KeeperError> {
        // Identifiers cannot start with '.', so this never collides with an artifact lock
        let path = locks_dir
            .join(category.as_str())
            .join(format!(".{}.lock", BACKUP_LOCK));
        Self::acquire(path, format!("{} backups", category))
    }

    fn acquire(path: PathBuf, scope: String) -> Result<Self, KeeperError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeeperError::io_at("create directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| KeeperError::io_at("open lock file", &path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(KeeperError::Locked { scope });
        }

        debug!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released lock {}", self.path.display());
    }
}
