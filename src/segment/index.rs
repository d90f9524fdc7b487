//! Index file implementation.
//!
//! The index is a flat array of fixed-width entries, one per appended record:
//!
//! ```text
//! [key_hash: 32 bytes][store_offset: u64 LE]
//! ```
//!
//! Because entries never vary in size, the file can be walked from the end
//! towards the start, which yields the newest entry for a hash first.

use super::append_file::AppendFile;
use crate::error::Result;
use crate::record::{KeyHash, KEY_HASH_SIZE};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Size of one index entry in bytes.
pub const ENTRY_SIZE: usize = KEY_HASH_SIZE + 8;

/// Number of entries fetched per read while scanning backwards.
const SCAN_BATCH: usize = 256;

/// One `{key_hash -> store_offset}` pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Hash of the record's key
    pub key_hash: KeyHash,
    /// Offset of the record in the segment's store
    pub offset: u64,
}

impl IndexEntry {
    /// Encode the entry (40 bytes)
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[..KEY_HASH_SIZE].copy_from_slice(&self.key_hash);
        buf[KEY_HASH_SIZE..].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    /// Decode an entry from exactly `ENTRY_SIZE` bytes
    pub fn decode(data: &[u8]) -> Self {
        debug_assert_eq!(data.len(), ENTRY_SIZE);
        let mut key_hash = [0u8; KEY_HASH_SIZE];
        key_hash.copy_from_slice(&data[..KEY_HASH_SIZE]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&data[KEY_HASH_SIZE..ENTRY_SIZE]);
        Self { key_hash, offset: u64::from_le_bytes(offset) }
    }
}

/// Append-only file of fixed-width index entries.
#[derive(Debug)]
pub struct Index {
    /// Write side; its published size only ever covers whole entries
    file: AppendFile,
    reader: Mutex<File>,
}

impl Index {
    /// Open an index file, creating it if it doesn't exist.
    ///
    /// A trailing partial entry left by an interrupted append is cut off.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self> {
        let file = AppendFile::open(path.as_ref(), sync)?;
        let len = file.size();
        let whole = len - len % ENTRY_SIZE as u64;
        if whole != len {
            log::warn!(
                "Index {:?} has a torn tail ({} stray bytes), truncating to {} bytes",
                file.path(),
                len - whole,
                whole
            );
            file.truncate(whole)?;
        }

        let reader = File::open(file.path())?;

        Ok(Self { file, reader: Mutex::new(reader) })
    }

    /// Append one entry at the end of the file.
    ///
    /// On failure the file is left at its previous size.
    pub fn append(&self, key_hash: &KeyHash, offset: u64) -> Result<()> {
        let entry = IndexEntry { key_hash: *key_hash, offset };
        self.file.append(&entry.encode())?;
        Ok(())
    }

    /// Iterate entries from the most recently appended to the oldest.
    ///
    /// The scan covers the entries published when it was created; entries
    /// appended afterwards are not visited.
    pub fn scan_reverse(&self) -> ReverseEntries<'_> {
        ReverseEntries { index: self, remaining: self.size(), batch: Vec::new(), failed: false }
    }

    /// Number of entries in the index
    pub fn len(&self) -> u64 {
        self.size() / ENTRY_SIZE as u64
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current size of the index in bytes
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    /// Get the path to the index file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Flush buffered data and fsync the file.
    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<()> {
        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

/// Back-to-front iterator over an [`Index`].
///
/// Entries are read in batches; the iterator yields an error once and then
/// stops if a read fails.
pub struct ReverseEntries<'a> {
    index: &'a Index,
    /// Bytes at the front of the file not yet loaded
    remaining: u64,
    /// Loaded entries, oldest first; popped from the back
    batch: Vec<IndexEntry>,
    failed: bool,
}

impl ReverseEntries<'_> {
    fn refill(&mut self) -> Result<()> {
        let batch_bytes = (SCAN_BATCH * ENTRY_SIZE) as u64;
        let start = self.remaining.saturating_sub(batch_bytes);
        let mut buf = vec![0u8; (self.remaining - start) as usize];
        self.index.read_range(start, &mut buf)?;

        self.batch.extend(buf.chunks_exact(ENTRY_SIZE).map(IndexEntry::decode));
        self.remaining = start;
        Ok(())
    }
}

impl Iterator for ReverseEntries<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.batch.is_empty() {
            if self.remaining == 0 {
                return None;
            }
            if let Err(e) = self.refill() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.batch.pop().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::hash_key;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn collect(index: &Index) -> Vec<IndexEntry> {
        index.scan_reverse().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_append_and_scan_reverse() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("1.index"), false).unwrap();

        let a = hash_key("a");
        let b = hash_key("b");
        index.append(&a, 0).unwrap();
        index.append(&b, 50).unwrap();
        index.append(&a, 100).unwrap();

        assert_eq!(index.size(), 3 * ENTRY_SIZE as u64);
        assert_eq!(index.len(), 3);

        let entries = collect(&index);
        let offsets: Vec<u64> = entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![100, 50, 0]);
        assert_eq!(entries[0].key_hash, a);
    }

    #[test]
    fn test_scan_empty() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("1.index"), false).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.scan_reverse().count(), 0);
    }

    #[test]
    fn test_scan_crosses_batches() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("1.index"), false).unwrap();

        let total = SCAN_BATCH * 2 + 17;
        for i in 0..total {
            index.append(&hash_key(&i.to_string()), i as u64).unwrap();
        }

        let offsets: Vec<u64> = collect(&index).iter().map(|e| e.offset).collect();
        let expected: Vec<u64> = (0..total as u64).rev().collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_scan_is_restartable() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("1.index"), false).unwrap();
        index.append(&hash_key("x"), 0).unwrap();

        let before = index.scan_reverse();
        index.append(&hash_key("y"), 45).unwrap();

        // The earlier scan only sees what existed when it started.
        assert_eq!(before.count(), 1);
        assert_eq!(index.scan_reverse().count(), 2);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.index");

        {
            let index = Index::open(&path, true).unwrap();
            index.append(&hash_key("k"), 7).unwrap();
        }

        // Simulate a crash halfway through the next entry.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xAB; 13]).unwrap();
        }

        let index = Index::open(&path, true).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENTRY_SIZE as u64);
        assert_eq!(collect(&index)[0].offset, 7);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_append_after_failed_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.index");
        let index = Index::open(&path, false).unwrap();
        index.append(&hash_key("a"), 0).unwrap();

        // Part of the failed entry reached the file before the write error.
        OpenOptions::new().append(true).open(&path).unwrap().write_all(&[0xCD; 9]).unwrap();
        index.file.redirect_writes(OpenOptions::new().write(true).open("/dev/full").unwrap());

        assert!(index.append(&hash_key("b"), 46).is_err());
        assert_eq!(index.len(), 1);

        index.append(&hash_key("c"), 46).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * ENTRY_SIZE as u64);

        let entries = collect(&index);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], IndexEntry { key_hash: hash_key("c"), offset: 46 });
        assert_eq!(entries[1], IndexEntry { key_hash: hash_key("a"), offset: 0 });
    }
}
