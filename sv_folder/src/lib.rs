//! The encrypted folder-name codec (C6): encrypt/decrypt, a recognition
//! heuristic, and a process-local plaintext cache.

pub mod cache;
pub mod codec;

pub use cache::{FolderNameCache, CACHE_CAPACITY};
pub use codec::{decrypt_folder_name, encrypt_folder_name, is_plausibly_encrypted};
