//! Store file implementation.
//!
//! A store holds encoded [`KeyRecord`](crate::record::KeyRecord) frames back to
//! back in append order. Appends only ever go to the end of the file, so the
//! offset returned by [`Store::append`] stays valid for the life of the file.

use super::append_file::AppendFile;
use crate::error::{Error, Result};
use crate::record::{KeyRecord, HEADER_SIZE};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Append-only file of record frames.
#[derive(Debug)]
pub struct Store {
    /// Write side; readers never look past its published size
    file: AppendFile,
    /// Separate handle for positioned reads
    reader: Mutex<File>,
}

impl Store {
    /// Open a store file, creating it if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self> {
        let file = AppendFile::open(path.as_ref(), sync)?;
        let reader = File::open(file.path())?;

        Ok(Self { file, reader: Mutex::new(reader) })
    }

    /// Append one frame and return the offset it was written at.
    ///
    /// The frame is flushed (and fsync'd when configured) before the new size
    /// is published. On failure the file is left at its previous size.
    pub fn append(&self, frame: &[u8]) -> Result<u64> {
        self.file.append(frame)
    }

    /// Read the frame that starts at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Vec<u8>> {
        let size = self.size();
        if offset >= size {
            return Err(Error::OutOfRange { offset, size });
        }
        if size - offset < HEADER_SIZE as u64 {
            return Err(Error::corruption(format!(
                "Frame at offset {} truncated: only {} bytes left",
                offset,
                size - offset
            )));
        }

        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let len = KeyRecord::frame_len(&header)?;
        if offset + len as u64 > size {
            return Err(Error::corruption(format!(
                "Frame at offset {} declares {} bytes, store holds {}",
                offset, len, size
            )));
        }

        let mut frame = vec![0u8; len];
        frame[..4].copy_from_slice(&header);
        reader.read_exact(&mut frame[4..])?;
        Ok(frame)
    }

    /// Read and decode the record at `offset`.
    pub fn read_record(&self, offset: u64) -> Result<KeyRecord> {
        KeyRecord::decode(&self.read_at(offset)?)
    }

    /// Current size of the store in bytes
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    /// Get the path to the store file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Flush buffered data and fsync the file.
    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        Store::open(dir.path().join("1.store"), false).unwrap()
    }

    #[test]
    fn test_append_returns_offsets() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.size(), 0);

        let first = KeyRecord::put("alpha", 1).encode();
        let second = KeyRecord::put("beta", 2).encode();

        assert_eq!(store.append(&first).unwrap(), 0);
        assert_eq!(store.append(&second).unwrap(), first.len() as u64);
        assert_eq!(store.size(), (first.len() + second.len()) as u64);
    }

    #[test]
    fn test_read_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.append(&KeyRecord::put("alpha", 1).encode()).unwrap();
        let offset = store.append(&KeyRecord::delete("beta", 2).encode()).unwrap();

        let record = store.read_record(offset).unwrap();
        assert_eq!(record.raw_key, "beta");
        assert!(record.tombstone);
        assert_eq!(store.read_record(0).unwrap().raw_key, "alpha");
    }

    #[test]
    fn test_read_out_of_range() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.append(&KeyRecord::put("alpha", 1).encode()).unwrap();

        match store.read_at(store.size()) {
            Err(Error::OutOfRange { .. }) => {}
            other => panic!("Expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_read_mid_frame_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.append(&KeyRecord::put("a-rather-long-key-for-this", 1).encode()).unwrap();

        // Byte 1 lands inside the length field, which then decodes as garbage.
        assert!(store.read_at(1).is_err());
    }

    #[test]
    fn test_store_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.store");

        let offset = {
            let store = Store::open(&path, true).unwrap();
            store.append(&KeyRecord::put("first", 1).encode()).unwrap();
            let offset = store.append(&KeyRecord::put("second", 2).encode()).unwrap();
            store.sync().unwrap();
            offset
        };

        let store = Store::open(&path, true).unwrap();
        assert_eq!(store.read_record(offset).unwrap().raw_key, "second");

        let size_before = store.size();
        let third = store.append(&KeyRecord::put("third", 3).encode()).unwrap();
        assert_eq!(third, size_before);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_append_after_failed_append() {
        use std::fs::OpenOptions;
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let first = KeyRecord::put("a", 1).encode();
        store.append(&first).unwrap();

        // Half of the failed frame made it to disk before the device filled up.
        let failed = KeyRecord::put("b", 2).encode();
        OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap()
            .write_all(&failed[..failed.len() / 2])
            .unwrap();
        store.file.redirect_writes(OpenOptions::new().write(true).open("/dev/full").unwrap());

        assert!(matches!(store.append(&failed), Err(Error::Io(_))));
        assert_eq!(store.size(), first.len() as u64);

        let offset = store.append(&KeyRecord::put("c", 3).encode()).unwrap();
        assert_eq!(offset, first.len() as u64);
        assert_eq!(store.read_record(offset).unwrap().raw_key, "c");
        assert_eq!(std::fs::metadata(store.path()).unwrap().len(), store.size());
    }
}
