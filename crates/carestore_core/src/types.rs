//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version of a store.
///
/// A store's persisted version only ever increases.
pub type SchemaVersion = u64;

/// The schema version this build of the application writes.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = 2;

/// Identifier of a document within a store.
///
/// Identifiers are assigned by the store in insertion order and are never
/// reused. `DocumentId::UNASSIGNED` marks a record that has not been
/// inserted yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Placeholder id of a record that has not been stored.
    pub const UNASSIGNED: Self = Self(0);

    /// Creates an id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this id was assigned by a store.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
