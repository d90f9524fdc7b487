//! Configuration options for TinyamoDb.
//!
//! Options are grouped the same way as the on-disk config file:
//!
//! ```json
//! {
//!   "partition": { "count": 4 },
//!   "segment": { "max_store_bytes": 1048576, "max_index_bytes": 1048576 },
//!   "table": { "partition_key": "id" }
//! }
//! ```
//!
//! Every field is optional in the file; anything missing keeps its default.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Partitioning options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOptions {
    /// Number of partitions created for a fresh database.
    /// Fixed once the directory exists.
    /// Default: 4
    pub count: u8,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Segment rotation thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentOptions {
    /// Seal the active segment once its store file reaches this size.
    /// Default: 1MB
    pub max_store_bytes: u64,

    /// Seal the active segment once its index file reaches this size.
    /// Default: 1MB
    pub max_index_bytes: u64,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024, // 1MB
            max_index_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Table schema options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Name of the attribute used as partition key. Recorded for a future
    /// multi-attribute schema; it has no effect on storage.
    /// Default: "id"
    pub partition_key: String,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { partition_key: "id".to_string() }
    }
}

/// Configuration options for opening a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Partitioning options.
    pub partition: PartitionOptions,

    /// Segment rotation thresholds.
    pub segment: SegmentOptions,

    /// Table schema options.
    pub table: TableOptions,

    /// Create the database directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Fsync store and index files after every append.
    /// When false, appends are only flushed to the OS.
    /// Default: true
    pub sync_writes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            partition: PartitionOptions::default(),
            segment: SegmentOptions::default(),
            table: TableOptions::default(),
            create_if_missing: true,
            sync_writes: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Sets the partition count used when creating a fresh database.
    pub fn partition_count(mut self, count: u8) -> Self {
        self.partition.count = count;
        self
    }

    /// Sets the store size threshold for segment rotation.
    pub fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the index size threshold for segment rotation.
    pub fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the partition key attribute name.
    pub fn partition_key(mut self, name: impl Into<String>) -> Self {
        self.table.partition_key = name.into();
        self
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Enables or disables fsync after each append.
    pub fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.partition.count == 0 {
            return Err(Error::config("partition.count must be > 0"));
        }
        if self.segment.max_store_bytes == 0 {
            return Err(Error::config("segment.max_store_bytes must be > 0"));
        }
        if self.segment.max_index_bytes == 0 {
            return Err(Error::config("segment.max_index_bytes must be > 0"));
        }
        if self.table.partition_key.is_empty() {
            return Err(Error::config("table.partition_key must not be empty"));
        }
        Ok(())
    }
}
