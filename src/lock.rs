//! Advisory lock on a database directory.
//!
//! A `LOCK` file in the root is held with an exclusive `flock` for as long as
//! the database is open, so a second handle on the same directory fails fast
//! instead of interleaving appends with the first.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Name of the lock file inside the database root.
pub const LOCK_FILE: &str = "LOCK";

/// Exclusive lock held for the lifetime of an open database.
#[derive(Debug)]
pub struct DirLock {
    file: File,
}

impl DirLock {
    /// Acquire the lock for `root` without blocking.
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Locked(root.to_path_buf()));
        }

        Ok(Self { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
