//! Error types for TinyamoDb.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The result type used throughout TinyamoDb.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for TinyamoDb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Partition directories on disk do not form a contiguous `1..N` run.
    #[error("Inconsistent partition layout: expected partitions 1..={expected}, found {found:?}")]
    InconsistentPartitionLayout {
        /// Number of partitions implied by the directory count.
        expected: usize,
        /// Partition ids actually found on disk.
        found: Vec<u32>,
    },

    /// Segment files of a partition are not contiguous from 1.
    #[error("Inconsistent segment layout in partition {partition}: {detail}")]
    InconsistentSegmentLayout {
        /// The partition whose directory is inconsistent.
        partition: u32,
        /// What was wrong with it.
        detail: String,
    },

    /// A record frame failed structural validation.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A read was attempted past the end of a store file.
    #[error("Offset {offset} out of range (store size {size})")]
    OutOfRange {
        /// The requested offset.
        offset: u64,
        /// The store size at the time of the read.
        size: u64,
    },

    /// An append reached a sealed segment.
    #[error("Segment {segment} is sealed")]
    SegmentSealed {
        /// Id of the sealed segment.
        segment: u64,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another handle holds the directory lock.
    #[error("Database directory is locked: {0:?}")]
    Locked(PathBuf),

    /// Several partitions failed to close.
    #[error("Failed to close {} partition(s): {}", .0.len(), join_errors(.0))]
    Close(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns true for errors raised while validating configuration or the
    /// on-disk layout at open time.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InconsistentPartitionLayout { .. }
                | Error::InconsistentSegmentLayout { .. }
        )
    }

    /// Returns true if the error reports corrupted on-disk data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
