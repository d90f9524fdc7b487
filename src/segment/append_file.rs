//! Append handle shared by store and index files.
//!
//! Bytes become visible to readers only once the published size moves past
//! them. A failed append leaves the file exactly at its published size: the
//! writer's buffered bytes are discarded and any partial write is cut off,
//! so the next append lands where its returned offset says it does.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct AppendFile {
    path: PathBuf,
    /// `None` after a failed append whose rewind also failed; the next
    /// append retries the rewind before writing.
    writer: Mutex<Option<BufWriter<File>>>,
    /// Bytes of complete, flushed appends
    size: AtomicU64,
    /// Fsync after each append
    sync: bool,
}

impl AppendFile {
    /// Open `path` for appending, creating it if it doesn't exist.
    pub(crate) fn open(path: &Path, sync: bool) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
            size: AtomicU64::new(size),
            sync,
        })
    }

    /// Append `data` and return the offset it starts at.
    pub(crate) fn append(&self, data: &[u8]) -> Result<u64> {
        let mut slot = self.writer.lock();
        let offset = self.size.load(Ordering::Acquire);

        let mut writer = match slot.take() {
            Some(writer) => writer,
            None => self.rewound_writer(offset)?,
        };

        match write_through(&mut writer, data, self.sync) {
            Ok(()) => {
                *slot = Some(writer);
                self.size.store(offset + data.len() as u64, Ordering::Release);
                Ok(offset)
            }
            Err(e) => {
                // Drop the buffer without flushing it.
                let _ = writer.into_parts();
                match self.rewound_writer(offset) {
                    Ok(fresh) => *slot = Some(fresh),
                    Err(rewind) => {
                        log::error!("Failed to rewind {:?} to {} bytes: {}", self.path, offset, rewind)
                    }
                }
                Err(e)
            }
        }
    }

    /// Cut the file back to `len` bytes and publish that size.
    pub(crate) fn truncate(&self, len: u64) -> Result<()> {
        let mut slot = self.writer.lock();
        slot.take();
        *slot = Some(self.rewound_writer(len)?);
        if let Some(writer) = slot.as_ref() {
            writer.get_ref().sync_all()?;
        }
        self.size.store(len, Ordering::Release);
        Ok(())
    }

    /// Flush buffered data and fsync the file.
    pub(crate) fn sync(&self) -> Result<()> {
        let mut slot = self.writer.lock();
        if let Some(writer) = slot.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub(crate) fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh writer on the file, with anything past `len` removed.
    fn rewound_writer(&self, len: u64) -> Result<BufWriter<File>> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        if file.metadata()?.len() != len {
            file.set_len(len)?;
        }
        Ok(BufWriter::new(file))
    }

    /// Route the next writes to `file` instead of the real one.
    #[cfg(test)]
    pub(crate) fn redirect_writes(&self, file: File) {
        *self.writer.lock() = Some(BufWriter::new(file));
    }
}

fn write_through(writer: &mut BufWriter<File>, data: &[u8], sync: bool) -> Result<()> {
    writer.write_all(data)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}
