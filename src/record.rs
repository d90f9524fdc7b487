//! Key record format implementation.
//!
//! Each record in a store file is a self-describing frame:
//! - Frame length (4 bytes): length of the whole frame, header included
//! - Tombstone (1 byte): 1 if the key was deleted by this record, else 0
//! - Key hash (32 bytes): SHA-256 of the raw key
//! - Sequence (8 bytes): append time marker, informational only
//! - Raw key (variable): UTF-8 bytes of the key
//!
//! All integers are little-endian. There is no checksum; decoding only checks
//! that the frame is structurally consistent.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of a key hash in bytes.
pub const KEY_HASH_SIZE: usize = 32;

/// Size of the record header (length + tombstone + hash + sequence).
pub const HEADER_SIZE: usize = 4 + 1 + KEY_HASH_SIZE + 8;

/// Largest raw key accepted by the database.
pub const MAX_KEY_SIZE: usize = 64 * 1024; // 64KB

/// A fixed-width digest of a raw key.
pub type KeyHash = [u8; KEY_HASH_SIZE];

/// Computes the SHA-256 digest of a key.
pub fn hash_key(key: &str) -> KeyHash {
    Sha256::digest(key.as_bytes()).into()
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub(crate) fn now_micros() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
}

/// One immutable entry of the append-only log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// The original key, compared exactly on every hash hit.
    pub raw_key: String,
    /// SHA-256 of `raw_key`.
    pub key_hash: KeyHash,
    /// Append-time marker.
    pub sequence: u64,
    /// True if this record deletes the key.
    pub tombstone: bool,
}

impl KeyRecord {
    /// Create a live record for `key`.
    pub fn put(key: &str, sequence: u64) -> Self {
        Self::with_hash(key, hash_key(key), sequence, false)
    }

    /// Create a tombstone record for `key`.
    pub fn delete(key: &str, sequence: u64) -> Self {
        Self::with_hash(key, hash_key(key), sequence, true)
    }

    /// Create a record with an explicit hash.
    pub fn with_hash(key: &str, key_hash: KeyHash, sequence: u64, tombstone: bool) -> Self {
        Self { raw_key: key.to_string(), key_hash, sequence, tombstone }
    }

    /// Encode the record into a frame
    ///
    /// Format: [len: u32][tombstone: u8][key_hash: 32][sequence: u64][raw_key: bytes]
    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_size();
        let mut buf = BytesMut::with_capacity(len);

        buf.put_u32_le(len as u32);
        buf.put_u8(self.tombstone as u8);
        buf.put_slice(&self.key_hash);
        buf.put_u64_le(self.sequence);
        buf.put_slice(self.raw_key.as_bytes());

        buf.to_vec()
    }

    /// Decode a record from exactly one frame
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!("Record too short: {} bytes", data.len())));
        }

        let declared = data.get_u32_le() as usize;
        if declared != data.len() + 4 {
            return Err(Error::corruption(format!(
                "Frame length mismatch: declared {} bytes, got {}",
                declared,
                data.len() + 4
            )));
        }

        let tombstone = match data.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(Error::corruption(format!("Invalid tombstone flag: {}", other)));
            }
        };

        let mut key_hash = [0u8; KEY_HASH_SIZE];
        data.copy_to_slice(&mut key_hash);
        let sequence = data.get_u64_le();

        let raw_key = std::str::from_utf8(data)
            .map_err(|e| Error::corruption(format!("Key is not valid UTF-8: {}", e)))?
            .to_string();

        Ok(Self { raw_key, key_hash, sequence, tombstone })
    }

    /// Read the declared frame length from the first bytes of a frame.
    pub fn frame_len(header: &[u8]) -> Result<usize> {
        if header.len() < 4 {
            return Err(Error::corruption("Frame header truncated"));
        }
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len < HEADER_SIZE {
            return Err(Error::corruption(format!("Frame length {} below header size", len)));
        }
        Ok(len)
    }

    /// Get the total size of the encoded record
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.raw_key.len()
    }
}

/// Reject keys over [`MAX_KEY_SIZE`]. The empty key is valid.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::invalid_argument(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}
