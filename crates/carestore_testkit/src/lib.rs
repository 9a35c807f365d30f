//! # CareStore Testkit
//!
//! Test utilities for CareStore.
//!
//! This crate provides:
//! - Temporary stores wired to a caller-pumped callback queue
//! - Property-based test generators using proptest
//! - Test logging setup
//!
//! The cross-module test suites live in this crate's `tests/` directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use carestore_testkit::prelude::*;
//!
//! #[test]
//! fn journal_survives_reopen() {
//!     let store = TestStore::touched();
//!     assert!(store.queries().add_journal_entry(&JournalEntry::new(day, 4, "")));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::init_test_logging;
    pub use carestore_core::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::init_test_logging;
