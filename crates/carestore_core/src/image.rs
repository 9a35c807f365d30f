//! Decoded contents of the primary data file.

use crate::crypto::CryptoManager;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::types::{DocumentId, SchemaVersion};
use carestore_storage::DataFrame;
use ciborium::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Documents of one collection, keyed by id.
pub type Documents = BTreeMap<DocumentId, Value>;

/// The whole store, as held in memory for the duration of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreImage {
    /// Identity of the store, preserved across export and import.
    pub store_id: Uuid,
    /// Schema version the contents conform to.
    pub schema_version: SchemaVersion,
    /// Next id handed out by an insert.
    pub next_document_id: u64,
    /// Collections by name.
    pub collections: BTreeMap<String, Documents>,
}

impl Default for StoreImage {
    fn default() -> Self {
        Self {
            store_id: Uuid::nil(),
            schema_version: 0,
            next_document_id: 1,
            collections: BTreeMap::new(),
        }
    }
}

impl StoreImage {
    /// Creates an empty image at version 0 with a fresh store id.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            store_id: Uuid::new_v4(),
            ..Self::default()
        }
    }

    /// Returns the documents of a collection, if it has any.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Option<&Documents> {
        self.collections.get(collection)
    }

    /// Returns the number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.documents(collection).map_or(0, BTreeMap::len)
    }

    /// Returns the total number of documents.
    #[must_use]
    pub fn total_documents(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }

    /// Decodes one record by id.
    pub fn get<T: Record>(&self, id: DocumentId) -> CoreResult<Option<T>> {
        self.documents(T::COLLECTION)
            .and_then(|docs| docs.get(&id))
            .map(|value| decode_record(id, value))
            .transpose()
    }

    /// Decodes every record of a type, in id order.
    pub fn all<T: Record>(&self) -> CoreResult<Vec<T>> {
        let Some(docs) = self.documents(T::COLLECTION) else {
            return Ok(Vec::new());
        };
        docs.iter()
            .map(|(id, value)| decode_record(*id, value))
            .collect()
    }

    /// Encodes the image as a framed primary data file.
    pub fn to_file_bytes(&self, crypto: Option<&CryptoManager>) -> CoreResult<Vec<u8>> {
        let mut cbor = Vec::new();
        ciborium::ser::into_writer(self, &mut cbor).map_err(|e| CoreError::codec(e.to_string()))?;

        let (encrypted, payload) = match crypto {
            Some(manager) => (true, manager.encrypt(&cbor)?),
            None => (false, cbor),
        };
        Ok(DataFrame::new(self.schema_version, encrypted, payload).encode())
    }

    /// Decodes a framed primary data file.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::EncryptionKeyRequired`] if the file is sealed
    /// and no cipher was given, and with a storage or format error if the
    /// frame is damaged.
    pub fn from_file_bytes(data: &[u8], crypto: Option<&CryptoManager>) -> CoreResult<Self> {
        let frame = DataFrame::decode(data)?;

        let cbor = match (frame.encrypted, crypto) {
            (true, Some(manager)) => manager.decrypt(&frame.payload)?,
            (true, None) => return Err(CoreError::EncryptionKeyRequired),
            (false, _) => frame.payload,
        };

        let image: Self = ciborium::de::from_reader(cbor.as_slice())
            .map_err(|e| CoreError::codec(e.to_string()))?;

        if image.schema_version != frame.schema_version {
            return Err(CoreError::invalid_format(format!(
                "frame header says version {} but contents say {}",
                frame.schema_version, image.schema_version
            )));
        }
        if image.next_document_id == 0 {
            return Err(CoreError::invalid_format("document id counter is zero"));
        }
        Ok(image)
    }
}

pub(crate) fn encode_record<T: Record>(record: &T) -> CoreResult<Value> {
    Value::serialized(record).map_err(|e| CoreError::codec(e.to_string()))
}

pub(crate) fn decode_record<T: Record>(id: DocumentId, value: &Value) -> CoreResult<T> {
    let mut record: T = value
        .deserialized()
        .map_err(|e| CoreError::codec(format!("{} {id}: {e}", T::COLLECTION)))?;
    record.set_id(id);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DiagnosisType;

    fn image_with_one_type() -> StoreImage {
        let mut image = StoreImage::empty();
        let record = DiagnosisType::new("Asthma");
        image
            .collections
            .entry(DiagnosisType::COLLECTION.to_string())
            .or_default()
            .insert(DocumentId::new(1), encode_record(&record).unwrap());
        image.next_document_id = 2;
        image
    }

    #[test]
    fn file_bytes_roundtrip() {
        let image = image_with_one_type();
        let bytes = image.to_file_bytes(None).unwrap();
        let decoded = StoreImage::from_file_bytes(&bytes, None).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn typed_reads() {
        let image = image_with_one_type();

        let found: DiagnosisType = image.get(DocumentId::new(1)).unwrap().unwrap();
        assert_eq!(found.id, DocumentId::new(1));
        assert_eq!(found.name, "Asthma");

        assert!(image.get::<DiagnosisType>(DocumentId::new(9)).unwrap().is_none());
        assert_eq!(image.all::<DiagnosisType>().unwrap().len(), 1);
        assert_eq!(image.count(DiagnosisType::COLLECTION), 1);
        assert_eq!(image.count("missing"), 0);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = image_with_one_type().to_file_bytes(None).unwrap();
        assert!(StoreImage::from_file_bytes(&bytes[..bytes.len() - 3], None).is_err());
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn sealed_file_needs_key() {
        use crate::crypto::EncryptionKey;

        let key = EncryptionKey::generate().unwrap();
        let manager = CryptoManager::new(&key).unwrap();
        let image = image_with_one_type();
        let bytes = image.to_file_bytes(Some(&manager)).unwrap();

        assert!(matches!(
            StoreImage::from_file_bytes(&bytes, None),
            Err(CoreError::EncryptionKeyRequired)
        ));
        assert_eq!(
            StoreImage::from_file_bytes(&bytes, Some(&manager)).unwrap(),
            image
        );
    }
}
