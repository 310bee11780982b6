//! The external-storage adapter (C8).
//!
//! Abstracts the host's directory enumeration and stream I/O behind a small
//! surface, grounded on `s5_core::store::Store` / `blob_stores/local` /
//! `blob_stores/memory`, but adapted from a content-addressed path scheme to
//! a flat-folder scheme: paths are a vault-relative folder path plus a file
//! name, never a hash-derived path. Implementations are expected to stream,
//! not buffer whole files; `open_read` must support sequential reads from
//! position zero and must be re-openable.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::VaultResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry returned by [`VaultStore::enumerate`].
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Abstraction over the host's directory enumerator and stream reader/writer.
///
/// `folder` arguments are vault-relative paths using `/` as separator, with
/// the empty string denoting the vault root; they never contain `..`.
#[async_trait]
pub trait VaultStore: std::fmt::Debug + Send + Sync + 'static {
    /// Lists the direct children of `folder`.
    async fn enumerate(&self, folder: &str) -> VaultResult<Vec<StoreEntry>>;

    /// Opens `folder/name` for sequential reading from position zero.
    async fn open_read(
        &self,
        folder: &str,
        name: &str,
    ) -> VaultResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Reads `folder/name` fully into memory. Callers that only need a
    /// handful of header bytes (`peek_metadata`) should prefer `open_read`.
    async fn read_to_end(&self, folder: &str, name: &str) -> VaultResult<Bytes>;

    /// Opens `folder/name` for writing. Implementations write to a
    /// temporary location and only make the write visible at `folder/name`
    /// once writing is complete and the caller signals success — see
    /// `commit_write`/`abort_write` on concrete adapters.
    async fn open_write(
        &self,
        folder: &str,
        name: &str,
    ) -> VaultResult<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Writes `bytes` to `folder/name` as a single atomic operation.
    async fn write_bytes(&self, folder: &str, name: &str, bytes: Bytes) -> VaultResult<()>;

    /// Removes `folder/name`. Deleting a name that does not exist is not an
    /// error.
    async fn delete(&self, folder: &str, name: &str) -> VaultResult<()>;

    /// Creates a child folder `folder/name`, recursively creating `folder`
    /// itself if necessary.
    async fn create_subdir(&self, folder: &str, name: &str) -> VaultResult<()>;

    /// Renames `folder/old_name` to `folder/new_name`.
    async fn rename(&self, folder: &str, old_name: &str, new_name: &str) -> VaultResult<()>;

    /// Returns whether `folder/name` exists (file or directory).
    async fn exists(&self, folder: &str, name: &str) -> VaultResult<bool>;
}
