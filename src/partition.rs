//! Partitions: one shard of the keyspace backed by a chain of segments.
//!
//! Segments are kept oldest to newest; the last one is the active segment and
//! every other segment is sealed. Reads walk the chain from the newest segment
//! back, so the first record found for a key is the latest one written.
//!
//! Writers (`put` and `delete`) are serialized by a per-partition lock held
//! across the pre-write lookup, any rotation, and the append. Readers only
//! take a brief shared lock to snapshot the segment list and may run while a
//! write is in progress.

use crate::config::SegmentOptions;
use crate::error::{Error, Result};
use crate::record::{hash_key, now_micros, KeyHash, KeyRecord};
use crate::segment::{parse_segment_filename, Segment, SegmentFile, SegmentInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fixed shard of the keyspace.
#[derive(Debug)]
pub struct Partition {
    id: u32,
    dir: PathBuf,
    options: SegmentOptions,
    sync: bool,

    /// Serializes writers; guards the last issued sequence number
    writer: Mutex<u64>,

    /// Segments ordered by id; the last one is active
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl Partition {
    /// Open partition `id` under `root`, creating its directory if needed.
    ///
    /// Existing segments are reopened in id order; all but the newest are
    /// sealed. If the newest is already full, a fresh active segment is
    /// created after it.
    pub fn open(root: &Path, id: u32, options: &SegmentOptions, sync: bool) -> Result<Self> {
        let dir = root.join(id.to_string());
        std::fs::create_dir_all(&dir)?;

        let ids = Self::scan_segment_ids(&dir, id)?;
        let mut segments = Vec::with_capacity(ids.len() + 1);
        for (i, segment_id) in ids.iter().enumerate() {
            let segment = Segment::open(&dir, *segment_id, options, sync)?;
            if i + 1 < ids.len() {
                segment.seal();
            }
            segments.push(Arc::new(segment));
        }

        match segments.last().map(|s| (s.id(), s.is_full())) {
            Some((_, false)) => {}
            Some((last, true)) => {
                segments[segments.len() - 1].seal();
                let next = last + 1;
                log::info!("Partition {}: segment {} is full, rolling to {}", id, last, next);
                segments.push(Arc::new(Segment::open(&dir, next, options, sync)?));
            }
            None => {
                log::info!("Partition {}: creating first segment in {:?}", id, dir);
                segments.push(Arc::new(Segment::open(&dir, 1, options, sync)?));
            }
        }

        log::info!("Opened partition {} with {} segment(s)", id, segments.len());

        Ok(Self {
            id,
            dir,
            options: options.clone(),
            sync,
            writer: Mutex::new(0),
            segments: RwLock::new(segments),
        })
    }

    /// Collect segment ids present in `dir` and check they run 1..=n with
    /// both files present.
    fn scan_segment_ids(dir: &Path, partition: u32) -> Result<Vec<u64>> {
        let mut stores = BTreeSet::new();
        let mut indexes = BTreeSet::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(parse_segment_filename) {
                Some(SegmentFile::Store(id)) => {
                    stores.insert(id);
                }
                Some(SegmentFile::Index(id)) => {
                    indexes.insert(id);
                }
                None => {}
            }
        }

        if let Some(id) = stores.symmetric_difference(&indexes).next() {
            return Err(Error::InconsistentSegmentLayout {
                partition,
                detail: format!("segment {} is missing its store or index file", id),
            });
        }

        let ids: Vec<u64> = stores.into_iter().collect();
        if ids.iter().enumerate().any(|(i, id)| *id != i as u64 + 1) {
            return Err(Error::InconsistentSegmentLayout {
                partition,
                detail: format!("segment ids {:?} are not contiguous from 1", ids),
            });
        }

        Ok(ids)
    }

    /// Write `key`, returning the key if it was live before the write.
    pub fn put(&self, key: &str) -> Result<Option<String>> {
        self.write(key, false)
    }

    /// Look up `key`; `None` if it was never written or was deleted.
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(live_key(self.lookup(&hash_key(key), key)?))
    }

    /// Delete `key`, returning the key if it was live before the delete.
    pub fn delete(&self, key: &str) -> Result<Option<String>> {
        self.write(key, true)
    }

    fn write(&self, key: &str, tombstone: bool) -> Result<Option<String>> {
        let key_hash = hash_key(key);
        let mut last_sequence = self.writer.lock();

        let previous = live_key(self.lookup(&key_hash, key)?);

        // Sequence only orders records for humans; keep it strictly increasing.
        let sequence = now_micros().max(*last_sequence + 1);
        *last_sequence = sequence;

        let record = KeyRecord::with_hash(key, key_hash, sequence, tombstone);
        let active = self.active_for_append()?;
        let outcome = active.append(&record)?;

        log::trace!(
            "Partition {}: {} {:?} at segment {} offset {}",
            self.id,
            if tombstone { "delete" } else { "put" },
            key,
            active.id(),
            outcome.offset
        );

        Ok(previous)
    }

    /// Return the active segment, rotating first if it is already sealed.
    ///
    /// Callers hold the writer lock.
    fn active_for_append(&self) -> Result<Arc<Segment>> {
        let active = self.active_segment();
        if !active.is_sealed() {
            return Ok(active);
        }

        let next_id = active.id() + 1;
        let next = Arc::new(Segment::open(&self.dir, next_id, &self.options, self.sync)?);
        self.segments.write().push(Arc::clone(&next));

        log::info!("Partition {}: rotated from segment {} to {}", self.id, active.id(), next_id);
        Ok(next)
    }

    /// Find the latest record for a key across segments, newest first.
    pub fn lookup(&self, key_hash: &KeyHash, raw_key: &str) -> Result<Option<KeyRecord>> {
        let segments = self.segments.read().clone();
        for segment in segments.iter().rev() {
            if let Some(record) = segment.lookup(key_hash, raw_key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn active_segment(&self) -> Arc<Segment> {
        let segments = self.segments.read();
        // A partition is never empty once opened.
        Arc::clone(&segments[segments.len() - 1])
    }

    /// Partition id (1-based)
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Path to this partition's directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of segments, sealed and active
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Describe every segment, oldest first.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.read().iter().map(|s| s.info()).collect()
    }

    /// Flush and fsync every segment.
    pub fn sync(&self) -> Result<()> {
        let _writer = self.writer.lock();
        for segment in self.segments.read().iter() {
            segment.sync()?;
        }
        Ok(())
    }

    /// Flush every segment and release the file handles.
    ///
    /// All segments are attempted; the first failure is returned.
    pub fn close(self) -> Result<()> {
        let segments = std::mem::take(&mut *self.segments.write());
        let mut first_error = None;

        for segment in segments {
            if let Err(e) = segment.sync() {
                log::warn!("Partition {}: failed to sync segment {}: {}", self.id, segment.id(), e);
                first_error.get_or_insert(e);
            }
        }

        log::debug!("Closed partition {}", self.id);
        first_error.map_or(Ok(()), Err)
    }
}

fn live_key(record: Option<KeyRecord>) -> Option<String> {
    record.filter(|r| !r.tombstone).map(|r| r.raw_key)
}
