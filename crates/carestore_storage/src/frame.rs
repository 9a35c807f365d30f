//! Primary data file framing.
//!
//! ```text
//! | magic (4) | frame version (2) | flags (2) | schema version (8) | payload len (8) | crc32 (4) | payload... |
//! ```
//!
//! The schema version is kept in the header so the store's version can be
//! probed without decoding (or decrypting) the payload.

use crate::error::{StorageError, StorageResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Magic bytes at the start of every primary data file.
pub const FRAME_MAGIC: [u8; 4] = *b"CSDB";
/// Current frame layout version.
const FRAME_VERSION: u16 = 1;
/// Size of the fixed header in bytes.
pub const FRAME_HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 8 + 4;

const FLAG_ENCRYPTED: u16 = 0b1;

/// The fixed-size header of a primary data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Schema version of the store image in the payload.
    pub schema_version: u64,
    /// Whether the payload is sealed with the store's encryption key.
    pub encrypted: bool,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Parses a header from the first [`FRAME_HEADER_SIZE`] bytes of `data`.
    pub fn parse(data: &[u8]) -> StorageResult<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(StorageError::corrupted(format!(
                "data file too small: {} bytes",
                data.len()
            )));
        }
        if data[0..4] != FRAME_MAGIC {
            return Err(StorageError::corrupted("invalid data file magic"));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FRAME_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported data file version: {version}"
            )));
        }

        let flags = u16::from_le_bytes([data[6], data[7]]);
        let schema_version = u64::from_le_bytes(array_8(&data[8..16]));
        let payload_len = u64::from_le_bytes(array_8(&data[16..24]));
        let checksum = u32::from_le_bytes([data[24], data[25], data[26], data[27]]);

        Ok(Self {
            schema_version,
            encrypted: flags & FLAG_ENCRYPTED != 0,
            payload_len,
            checksum,
        })
    }

    /// Reads only the header of the data file at `path`.
    ///
    /// The file is opened, the header read, and the file closed before this
    /// returns.
    pub fn read_from(path: &Path) -> StorageResult<Self> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        let mut filled = 0;
        while filled < FRAME_HEADER_SIZE {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Self::parse(&buf[..filled])
    }
}

/// A decoded primary data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Schema version of the payload.
    pub schema_version: u64,
    /// Whether the payload is sealed.
    pub encrypted: bool,
    /// The (possibly sealed) payload.
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// Creates a frame around `payload`.
    #[must_use]
    pub fn new(schema_version: u64, encrypted: bool, payload: Vec<u8>) -> Self {
        Self {
            schema_version,
            encrypted,
            payload,
        }
    }

    /// Encodes the frame to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        let flags = if self.encrypted { FLAG_ENCRYPTED } else { 0 };

        data.extend_from_slice(&FRAME_MAGIC);
        data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&self.schema_version.to_le_bytes());
        data.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        data.extend_from_slice(&compute_crc32(&self.payload).to_le_bytes());
        data.extend_from_slice(&self.payload);
        data
    }

    /// Decodes and verifies a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid, the payload is truncated
    /// or has trailing bytes, or the checksum does not match.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let header = FrameHeader::parse(data)?;
        let payload = &data[FRAME_HEADER_SIZE..];

        if payload.len() as u64 != header.payload_len {
            return Err(StorageError::corrupted(format!(
                "payload length mismatch: header says {}, found {}",
                header.payload_len,
                payload.len()
            )));
        }

        let actual = compute_crc32(payload);
        if actual != header.checksum {
            return Err(StorageError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        Ok(Self {
            schema_version: header.schema_version,
            encrypted: header.encrypted,
            payload: payload.to_vec(),
        })
    }
}

/// Computes a CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[inline]
fn array_8(slice: &[u8]) -> [u8; 8] {
    [
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn crc32_known_value() {
        // Standard check value for "123456789"
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn encode_decode_frame() {
        let frame = DataFrame::new(7, true, b"sealed bytes".to_vec());
        let bytes = frame.encode();

        assert_eq!(bytes.len(), FRAME_HEADER_SIZE + 12);
        assert_eq!(DataFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn header_probe_reads_version_only() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        std::fs::write(&path, DataFrame::new(3, false, vec![1; 1024]).encode()).unwrap();

        let header = FrameHeader::read_from(&path).unwrap();
        assert_eq!(header.schema_version, 3);
        assert!(!header.encrypted);
        assert_eq!(header.payload_len, 1024);
    }

    #[test]
    fn empty_file_is_corrupted() {
        assert!(matches!(
            FrameHeader::parse(&[]),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = DataFrame::new(1, false, b"x".to_vec()).encode();
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(DataFrame::decode(&bytes).is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = DataFrame::new(1, false, b"hello".to_vec()).encode();
        let result = DataFrame::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn flipped_payload_bit_detected() {
        let mut bytes = DataFrame::new(1, false, b"hello".to_vec()).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            DataFrame::decode(&bytes),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn any_single_byte_corruption_in_payload_is_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut bytes = DataFrame::new(2, false, payload.clone()).encode();
            let at = FRAME_HEADER_SIZE + index.index(payload.len());
            bytes[at] ^= flip;
            prop_assert!(DataFrame::decode(&bytes).is_err());
        }
    }
}
