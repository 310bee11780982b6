//! Shared types, the error taxonomy, and the storage trait for the
//! encrypted-vault storage-format engine.
//!
//! This crate is the leaf dependency of the engine's other crates, the way
//! `s5_core` anchors the rest of the teacher's workspace.

pub mod error;
pub mod store;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use store::{EntryKind, StoreEntry, VaultStore};
pub use types::{ContentType, FileType, INDEX_CONTENT_TYPE};
