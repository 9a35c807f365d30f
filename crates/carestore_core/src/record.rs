//! Record traits.

use crate::types::DocumentId;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed document stored in a named collection.
///
/// Records are encoded as CBOR. The store owns id assignment: `insert`
/// overwrites whatever id the record carried, and reads set the id from the
/// document key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Name of the collection holding records of this type.
    const COLLECTION: &'static str;

    /// Returns the record's id.
    fn id(&self) -> DocumentId;

    /// Sets the record's id.
    fn set_id(&mut self, id: DocumentId);
}

/// A record that belongs to a calendar day.
pub trait DayRecord: Record {
    /// The day this record is filed under.
    fn day(&self) -> NaiveDate;
}
