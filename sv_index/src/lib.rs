//! The vault index (C7): entry shapes, the on-disk JSON document, and the
//! `VaultIndex` engine (load/save/generate, debounced autosave).

pub mod document;
pub mod entry;
pub mod index;

pub use entry::{is_blob_file_name, is_index_file_name, IndexEntry};
pub use index::{generate_blob_name, VaultIndex};
