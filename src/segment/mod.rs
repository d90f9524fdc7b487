//! Segments: bounded pairs of store and index files.
//!
//! A segment is *active* while it accepts appends and *sealed* once either of
//! its files reaches the configured threshold. Sealing is permanent.
//!
//! ## Layout
//!
//! ```text
//! <partition_dir>/<id>.store   record frames
//! <partition_dir>/<id>.index   {key_hash, offset} entries
//! ```
//!
//! ## Lookup
//!
//! The index is scanned newest-first. Every entry whose hash matches is
//! resolved through the store and its raw key compared exactly, so two keys
//! with the same hash never shadow each other.

mod append_file;
pub mod index;
pub mod store;

pub use index::{Index, IndexEntry, ReverseEntries, ENTRY_SIZE};
pub use store::Store;

use crate::config::SegmentOptions;
use crate::error::{Error, Result};
use crate::record::{KeyHash, KeyRecord};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of a successful [`Segment::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Offset of the record in the store file
    pub offset: u64,
    /// The append pushed the segment over a threshold and sealed it
    pub became_full: bool,
}

/// Point-in-time description of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment id
    pub id: u64,
    /// Whether the segment is read-only
    pub sealed: bool,
    /// Store file size in bytes
    pub store_bytes: u64,
    /// Index file size in bytes
    pub index_bytes: u64,
}

/// One store + index pair sharing a numeric id.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    store: Store,
    index: Index,
    sealed: AtomicBool,
    max_store_bytes: u64,
    max_index_bytes: u64,
}

impl Segment {
    /// Open segment `id` in `dir`, creating empty files if needed.
    ///
    /// The segment starts active; the owning partition seals it if required.
    pub fn open(dir: &Path, id: u64, options: &SegmentOptions, sync: bool) -> Result<Self> {
        let store = Store::open(dir.join(store_filename(id)), sync)?;
        let index = Index::open(dir.join(index_filename(id)), sync)?;

        log::debug!(
            "Opened segment {} in {:?} (store {} bytes, index {} bytes)",
            id,
            dir,
            store.size(),
            index.size()
        );

        Ok(Self {
            id,
            store,
            index,
            sealed: AtomicBool::new(false),
            max_store_bytes: options.max_store_bytes,
            max_index_bytes: options.max_index_bytes,
        })
    }

    /// Append a record, sealing the segment if a threshold is now reached.
    ///
    /// The store frame is written and flushed before its index entry, so an
    /// index entry never points at a partial frame.
    pub fn append(&self, record: &KeyRecord) -> Result<AppendOutcome> {
        if self.is_sealed() {
            return Err(Error::SegmentSealed { segment: self.id });
        }

        let offset = self.store.append(&record.encode())?;
        self.index.append(&record.key_hash, offset)?;

        let became_full = self.is_full();
        if became_full {
            self.seal();
            log::debug!(
                "Segment {} reached its threshold (store {} bytes, index {} bytes)",
                self.id,
                self.store.size(),
                self.index.size()
            );
        }

        Ok(AppendOutcome { offset, became_full })
    }

    /// Find the most recent record for `raw_key` in this segment.
    ///
    /// Tombstones are returned as-is; callers decide what they mean.
    pub fn lookup(&self, key_hash: &KeyHash, raw_key: &str) -> Result<Option<KeyRecord>> {
        for entry in self.index.scan_reverse() {
            let entry = entry?;
            if entry.key_hash != *key_hash {
                continue;
            }

            let record = self.store.read_record(entry.offset)?;
            if record.raw_key == raw_key {
                return Ok(Some(record));
            }

            log::trace!(
                "Hash collision in segment {}: {:?} vs {:?}",
                self.id,
                record.raw_key,
                raw_key
            );
        }

        Ok(None)
    }

    /// Whether either file is at or over its threshold.
    pub fn is_full(&self) -> bool {
        self.store.size() >= self.max_store_bytes || self.index.size() >= self.max_index_bytes
    }

    /// Mark the segment read-only. Idempotent.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Whether the segment rejects appends.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Segment id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of records appended to this segment
    pub fn record_count(&self) -> u64 {
        self.index.len()
    }

    /// Snapshot of this segment's state.
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            id: self.id,
            sealed: self.is_sealed(),
            store_bytes: self.store.size(),
            index_bytes: self.index.size(),
        }
    }

    /// Flush and fsync both files.
    pub fn sync(&self) -> Result<()> {
        self.store.sync()?;
        self.index.sync()
    }
}

/// Generate the store filename for a segment id
pub fn store_filename(id: u64) -> String {
    format!("{}.store", id)
}

/// Generate the index filename for a segment id
pub fn index_filename(id: u64) -> String {
    format!("{}.index", id)
}

/// Which file of a segment a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFile {
    /// `<id>.store`
    Store(u64),
    /// `<id>.index`
    Index(u64),
}

/// Parse a segment filename to extract its id and kind
pub fn parse_segment_filename(filename: &str) -> Option<SegmentFile> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let id: u64 = stem.parse().ok()?;
    // `01.store` would otherwise alias segment 1.
    if id == 0 || id.to_string() != stem {
        return None;
    }
    match ext {
        "store" => Some(SegmentFile::Store(id)),
        "index" => Some(SegmentFile::Index(id)),
        _ => None,
    }
}
