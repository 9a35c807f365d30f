//! # CareStore Storage
//!
//! File-system primitives for CareStore.
//!
//! This crate is the lowest layer of the store. It knows where the store's
//! files live and how to touch them safely, but it never interprets the
//! payload it moves around.
//!
//! ## Design Principles
//!
//! - Every file the store owns is named by [`StoreLayout`]; nothing else
//!   builds store paths by hand
//! - Durable writes go through write-then-rename ([`write_atomic`])
//! - Cross-process exclusion uses advisory locks ([`StoreLock`])
//! - Scratch directories are scope guards ([`ScratchDir`]) and are removed on
//!   every exit path
//!
//! ## Example
//!
//! ```no_run
//! use carestore_storage::{DataFrame, StoreLayout, write_atomic};
//! use std::path::Path;
//!
//! let layout = StoreLayout::new(Path::new("store"), "default.carestore");
//! layout.ensure_directory().unwrap();
//! let frame = DataFrame::new(1, false, b"payload".to_vec());
//! write_atomic(&layout.primary_path(), &layout.note_path(), &frame.encode()).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod frame;
mod layout;
mod lock;
mod scratch;

pub use error::{StorageError, StorageResult};
pub use file::{read_file, sync_directory, write_atomic};
pub use frame::{compute_crc32, DataFrame, FrameHeader, FRAME_HEADER_SIZE, FRAME_MAGIC};
pub use layout::StoreLayout;
pub use lock::{LockMode, StoreLock};
pub use scratch::ScratchDir;
