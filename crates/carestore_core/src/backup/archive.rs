//! The backup archive container.
//!
//! ## Format
//!
//! ```text
//! | magic "CBAK" (4) | version (2) | created_at_ms (8) | schema_version (8) |
//! | store_id (16) | entry_count (4) | entries... | sha256 (32) |
//!
//! entry := | name_len (2) | name (utf-8) | data_len (8) | data |
//! ```
//!
//! All integers are little-endian. The digest covers every byte before it.

use crate::error::{CoreError, CoreResult};
use crate::types::SchemaVersion;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// File name used for archives in scratch directories and by callers that
/// save an export.
pub const ARCHIVE_FILE_NAME: &str = "carestore-backup.cbak";

/// MIME type of an archive, for callers that share exports.
pub const ARCHIVE_MIME_TYPE: &str = "application/vnd.carestore.backup";

/// Magic bytes at the start of every archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"CBAK";
/// Current archive format version.
const ARCHIVE_VERSION: u16 = 1;
/// Header size (magic + version + created_at + schema_version + store_id + entry_count).
pub const ARCHIVE_HEADER_SIZE: usize = 4 + 2 + 8 + 8 + 16 + 4;
/// Footer size (SHA-256 digest).
const DIGEST_SIZE: usize = 32;

/// Information from an archive header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    /// When the archive was created (Unix timestamp in milliseconds).
    pub created_at_ms: u64,
    /// Schema version of the archived store.
    pub schema_version: SchemaVersion,
    /// Identity of the archived store.
    pub store_id: Uuid,
    /// Number of entries.
    pub entry_count: u32,
}

impl ArchiveMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn now(schema_version: SchemaVersion, store_id: Uuid) -> Self {
        let created_at_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            created_at_ms,
            schema_version,
            store_id,
            entry_count: 0,
        }
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.created_at_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// One named file in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name, without directories.
    pub name: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A decoded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// Header information.
    pub metadata: ArchiveMetadata,
    /// Entries in archive order.
    pub entries: Vec<ArchiveEntry>,
}

impl Archive {
    /// Returns the entry with the given name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Encodes entries into an archive.
///
/// `metadata.entry_count` is ignored and taken from `entries`.
///
/// # Errors
///
/// Fails if an entry name is not a plain file name or is too long.
pub fn pack(metadata: &ArchiveMetadata, entries: &[ArchiveEntry]) -> CoreResult<Vec<u8>> {
    let entry_count = u32::try_from(entries.len())
        .map_err(|_| CoreError::invalid_format("too many archive entries"))?;
    let body: usize = entries.iter().map(|e| 2 + e.name.len() + 8 + e.data.len()).sum();
    let mut data = Vec::with_capacity(ARCHIVE_HEADER_SIZE + body + DIGEST_SIZE);

    data.extend_from_slice(&ARCHIVE_MAGIC);
    data.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
    data.extend_from_slice(&metadata.created_at_ms.to_le_bytes());
    data.extend_from_slice(&metadata.schema_version.to_le_bytes());
    data.extend_from_slice(metadata.store_id.as_bytes());
    data.extend_from_slice(&entry_count.to_le_bytes());

    for entry in entries {
        check_entry_name(&entry.name)?;
        let name_len = u16::try_from(entry.name.len())
            .map_err(|_| CoreError::invalid_format("archive entry name too long"))?;
        data.extend_from_slice(&name_len.to_le_bytes());
        data.extend_from_slice(entry.name.as_bytes());
        data.extend_from_slice(&(entry.data.len() as u64).to_le_bytes());
        data.extend_from_slice(&entry.data);
    }

    let digest = Sha256::digest(&data);
    data.extend_from_slice(&digest);
    Ok(data)
}

/// Decodes and verifies an archive.
///
/// # Errors
///
/// Fails if the archive is truncated, has the wrong magic or version, does
/// not match its digest, or contains an entry with an unsafe name.
pub fn unpack(data: &[u8]) -> CoreResult<Archive> {
    let metadata = validate(data)?;
    let body = &data[ARCHIVE_HEADER_SIZE..data.len() - DIGEST_SIZE];

    let mut reader = Reader::new(body);
    let mut entries = Vec::with_capacity(metadata.entry_count.min(64) as usize);
    for _ in 0..metadata.entry_count {
        let name_len = usize::from(reader.u16()?);
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| CoreError::invalid_format("archive entry name is not UTF-8"))?
            .to_string();
        check_entry_name(&name)?;
        let data_len = usize::try_from(reader.u64()?)
            .map_err(|_| CoreError::invalid_format("archive entry too large"))?;
        let data = reader.take(data_len)?.to_vec();
        entries.push(ArchiveEntry { name, data });
    }
    if !reader.is_empty() {
        return Err(CoreError::invalid_format("trailing bytes after archive entries"));
    }

    Ok(Archive { metadata, entries })
}

/// Reads archive metadata without verifying the digest.
pub fn read_metadata(data: &[u8]) -> CoreResult<ArchiveMetadata> {
    if data.len() < ARCHIVE_HEADER_SIZE + DIGEST_SIZE {
        return Err(CoreError::invalid_format("archive too small"));
    }
    if data[0..4] != ARCHIVE_MAGIC {
        return Err(CoreError::invalid_format("invalid archive magic"));
    }

    let mut reader = Reader::new(&data[4..ARCHIVE_HEADER_SIZE]);
    let version = reader.u16()?;
    if version != ARCHIVE_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported archive version: {version}"
        )));
    }
    let created_at_ms = reader.u64()?;
    let schema_version = reader.u64()?;
    let store_id = Uuid::from_slice(reader.take(16)?)
        .map_err(|e| CoreError::invalid_format(e.to_string()))?;
    let entry_count = reader.u32()?;

    Ok(ArchiveMetadata {
        created_at_ms,
        schema_version,
        store_id,
        entry_count,
    })
}

/// Verifies an archive's header and digest and returns its metadata.
pub fn validate(data: &[u8]) -> CoreResult<ArchiveMetadata> {
    let metadata = read_metadata(data)?;

    let digest_offset = data.len() - DIGEST_SIZE;
    let computed = Sha256::digest(&data[..digest_offset]);
    if computed.as_slice() != &data[digest_offset..] {
        return Err(CoreError::invalid_format("archive digest mismatch"));
    }
    Ok(metadata)
}

fn check_entry_name(name: &str) -> CoreResult<()> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if unsafe_name {
        return Err(CoreError::invalid_format(format!(
            "unsafe archive entry name: {name:?}"
        )));
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if len > self.data.len() {
            return Err(CoreError::invalid_format("archive entry extends beyond data"));
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    fn u16(&mut self) -> CoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> (ArchiveMetadata, Vec<ArchiveEntry>) {
        let metadata = ArchiveMetadata::now(2, Uuid::new_v4());
        let entries = vec![ArchiveEntry::new("default.carestore", b"frame bytes".to_vec())];
        (metadata, entries)
    }

    #[test]
    fn pack_and_unpack() {
        let (metadata, entries) = sample();
        let data = pack(&metadata, &entries).unwrap();

        let archive = unpack(&data).unwrap();
        assert_eq!(archive.entries, entries);
        assert_eq!(archive.metadata.entry_count, 1);
        assert_eq!(archive.metadata.store_id, metadata.store_id);
        assert_eq!(archive.metadata.schema_version, 2);
        assert!(archive.metadata.created_at().is_some());
        assert!(archive.entry("default.carestore").is_some());
    }

    #[test]
    fn header_size_matches_layout() {
        let (metadata, _) = sample();
        let data = pack(&metadata, &[]).unwrap();
        assert_eq!(data.len(), ARCHIVE_HEADER_SIZE + DIGEST_SIZE);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            unpack(&[]),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let (metadata, entries) = sample();
        let mut data = pack(&metadata, &entries).unwrap();
        data[0] = b'X';
        assert!(read_metadata(&data).is_err());
    }

    #[test]
    fn corruption_is_detected_by_digest() {
        let (metadata, entries) = sample();
        let mut data = pack(&metadata, &entries).unwrap();
        let last_payload_byte = data.len() - DIGEST_SIZE - 1;
        data[last_payload_byte] ^= 0xFF;

        assert!(read_metadata(&data).is_ok());
        assert!(validate(&data).is_err());
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let (metadata, _) = sample();
        for name in ["", "..", "../escape", "dir/file", "dir\\file"] {
            let entries = vec![ArchiveEntry::new(name, vec![1])];
            assert!(pack(&metadata, &entries).is_err(), "accepted {name:?}");
        }
    }

    proptest! {
        #[test]
        fn any_single_byte_flip_is_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
        ) {
            let metadata = ArchiveMetadata::now(1, Uuid::nil());
            let mut data = pack(&metadata, &[ArchiveEntry::new("f", payload)]).unwrap();
            let i = index.index(data.len());
            data[i] ^= 0x01;
            prop_assert!(unpack(&data).is_err());
        }
    }
}
