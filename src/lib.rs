//! # TinyamoDb - An Embedded Partitioned Key Store
//!
//! TinyamoDb models a single-attribute table: callers put, read and delete keys
//! by name, and every mutation reports whether the key existed before it.
//! Nothing is ever updated in place; each write appends a record and newer
//! records shadow older ones.
//!
//! ## Architecture
//!
//! - **Record**: binary frame holding the key, its SHA-256 hash, a sequence
//!   marker and a tombstone flag
//! - **Store / Index**: append-only record file and its fixed-width
//!   `{hash -> offset}` companion
//! - **Segment**: one store + index pair, sealed once a size threshold is hit
//! - **Partition**: a chain of segments owning one shard of the keyspace
//! - **Db**: a fixed set of partitions selected by key hash
//!
//! On disk:
//!
//! ```text
//! <root>/LOCK
//! <root>/<partition_id>/<segment_id>.store
//! <root>/<partition_id>/<segment_id>.index
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tinyamodb::{Db, Options};
//!
//! # fn main() -> Result<(), tinyamodb::Error> {
//! let db = Db::open("./data", Options::default().partition_count(4))?;
//!
//! assert_eq!(db.put("user#1")?, None);
//! assert_eq!(db.put("user#1")?, Some("user#1".to_string()));
//! assert_eq!(db.read("user#1")?, Some("user#1".to_string()));
//!
//! db.delete("user#1")?;
//! assert_eq!(db.read("user#1")?, None);
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod lock;
pub mod partition;
pub mod record;
pub mod segment;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use partition::Partition;
pub use record::{hash_key, KeyHash, KeyRecord};
pub use segment::SegmentInfo;

use lock::DirLock;
use record::validate_key;
use std::path::{Path, PathBuf};

/// Select the partition owning a key.
///
/// The first four bytes of the key's SHA-256 digest, read big-endian, modulo
/// the partition count, plus one. Depends on nothing but its arguments, so a
/// key maps to the same partition across restarts as long as the count is
/// unchanged.
///
/// # Panics
///
/// Panics if `partition_count` is zero.
pub fn determine_partition(key: &str, partition_count: u32) -> u32 {
    partition_for_hash(&hash_key(key), partition_count)
}

fn partition_for_hash(key_hash: &KeyHash, partition_count: u32) -> u32 {
    let prefix = u32::from_be_bytes([key_hash[0], key_hash[1], key_hash[2], key_hash[3]]);
    prefix % partition_count + 1
}

/// The main database handle.
///
/// # Thread Safety
///
/// `Db` is `Send + Sync` and can be shared across threads with `Arc<Db>`.
/// Writes to one partition are serialized; different partitions never
/// contend with each other.
#[derive(Debug)]
pub struct Db {
    /// Database directory path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// Partition `i + 1` lives at index `i`
    partitions: Vec<Partition>,

    /// Held until the handle is closed or dropped
    _lock: DirLock,
}

impl Db {
    /// Opens the database at `path`, creating it if it doesn't exist.
    ///
    /// A fresh directory gets `options.partition.count` partitions. An existing
    /// one must hold partitions `1..=N` with `N` equal to the configured count.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid, or the configured partition count differs
    ///   from the one on disk (`Error::Config`)
    /// - Partition directories are not contiguous from 1
    ///   (`Error::InconsistentPartitionLayout`)
    /// - Another handle has the directory open (`Error::Locked`)
    /// - Any file cannot be opened or created (`Error::Io`)
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        options.validate()?;

        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&path)?;
            } else {
                return Err(Error::config(format!(
                    "Database directory does not exist: {:?}",
                    path
                )));
            }
        }

        let lock = DirLock::acquire(&path)?;

        let existing = Self::scan_partition_ids(&path)?;
        let count = if existing.is_empty() {
            log::info!(
                "Creating database at {:?} with {} partition(s)",
                path,
                options.partition.count
            );
            options.partition.count as u32
        } else {
            let found = existing.len();
            if existing.iter().enumerate().any(|(i, id)| *id != i as u32 + 1) {
                return Err(Error::InconsistentPartitionLayout { expected: found, found: existing });
            }
            if found != options.partition.count as usize {
                return Err(Error::config(format!(
                    "Database at {:?} has {} partitions but {} are configured; \
                     the partition count cannot change after creation",
                    path, found, options.partition.count
                )));
            }
            found as u32
        };

        let mut partitions = Vec::with_capacity(count as usize);
        for id in 1..=count {
            partitions.push(Partition::open(&path, id, &options.segment, options.sync_writes)?);
        }

        log::info!("Opened database at {:?} ({} partitions)", path, count);

        Ok(Self { path, options, partitions, _lock: lock })
    }

    /// Numeric subdirectory names of `root`, sorted. Anything else, including
    /// zero-padded names, is ignored.
    fn scan_partition_ids(root: &Path) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok().filter(|id| id.to_string() == name));
            match id {
                Some(id) if id > 0 => ids.push(id),
                _ => log::debug!("Ignoring {:?} in database root", entry.path()),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Records `key` as present.
    ///
    /// Returns `Some(key)` if the key was already present, `None` if it was
    /// absent or deleted.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tinyamodb::{Db, Options};
    /// # fn main() -> Result<(), tinyamodb::Error> {
    /// # let db = Db::open("./data", Options::default())?;
    /// let previous = db.put("order#17")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn put(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        self.partition_of(key).put(key)
    }

    /// Returns `Some(key)` if the key is present, `None` otherwise.
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        self.partition_of(key).read(key)
    }

    /// Records `key` as deleted.
    ///
    /// Returns what [`Db::read`] would have returned just before the delete.
    /// Deleting an absent key still appends a tombstone.
    pub fn delete(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        self.partition_of(key).delete(key)
    }

    fn partition_of(&self, key: &str) -> &Partition {
        let id = self.partition_for(key);
        &self.partitions[id as usize - 1]
    }

    /// The id of the partition that owns `key`.
    pub fn partition_for(&self, key: &str) -> u32 {
        determine_partition(key, self.partition_count())
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    /// Returns the partition with the given 1-based id.
    pub fn partition(&self, id: u32) -> Option<&Partition> {
        id.checked_sub(1).and_then(|i| self.partitions.get(i as usize))
    }

    /// Describe the segments of partition `id`, oldest first.
    pub fn segments(&self, id: u32) -> Option<Vec<SegmentInfo>> {
        self.partition(id).map(Partition::segments)
    }

    /// Database directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the database was opened with
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Flushes and fsyncs every partition without closing.
    pub fn sync(&self) -> Result<()> {
        for partition in &self.partitions {
            partition.sync()?;
        }
        Ok(())
    }

    /// Closes the database, releasing every file handle.
    ///
    /// Every partition is closed even if an earlier one fails. A single
    /// failure is returned as-is; several are wrapped in `Error::Close`.
    pub fn close(self) -> Result<()> {
        let mut errors = Vec::new();
        for partition in self.partitions {
            let id = partition.id();
            if let Err(e) = partition.close() {
                log::warn!("Failed to close partition {}: {}", id, e);
                errors.push(e);
            }
        }

        log::info!("Closed database at {:?}", self.path);

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Close(errors)),
        }
    }
}
