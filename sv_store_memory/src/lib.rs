//! An in-memory `VaultStore` (C8) used for deterministic tests across the
//! rest of the workspace. Grounded on the teacher's `blob_stores::memory`
//! `MemoryStore`, adapted from a single flat content-hash keyspace to a
//! folder-path + file-name keyspace.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use sv_core::{EntryKind, StoreEntry, VaultError, VaultResult, VaultStore};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

fn full_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

fn child_prefix(folder: &str) -> String {
    if folder.is_empty() {
        String::new()
    } else {
        format!("{folder}/")
    }
}

/// Returns the direct-child name of `path` under `prefix`, if `path` is
/// actually a descendant of `prefix` and not nested further.
fn direct_child<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Arc<DashMap<String, Bytes>>,
    dirs: Arc<DashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryReader {
    data: Bytes,
    pos: usize,
}

impl AsyncRead for MemoryReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let remaining = &this.data[this.pos..];
        let amt = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..amt]);
        this.pos += amt;
        Poll::Ready(Ok(()))
    }
}

struct MemoryWriter {
    files: Arc<DashMap<String, Bytes>>,
    path: String,
    buf: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.get_mut().buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if !this.committed {
            this.files.insert(this.path.clone(), Bytes::from(std::mem::take(&mut this.buf)));
            this.committed = true;
        }
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn enumerate(&self, folder: &str) -> VaultResult<Vec<StoreEntry>> {
        let prefix = child_prefix(folder);
        let mut out = Vec::new();
        for entry in self.files.iter() {
            if let Some(name) = direct_child(entry.key(), &prefix) {
                out.push(StoreEntry {
                    name: name.to_string(),
                    kind: EntryKind::File,
                    size: entry.value().len() as u64,
                    modified: None,
                });
            }
        }
        for dir in self.dirs.iter() {
            if let Some(name) = direct_child(dir.key(), &prefix) {
                out.push(StoreEntry {
                    name: name.to_string(),
                    kind: EntryKind::Dir,
                    size: 0,
                    modified: None,
                });
            }
        }
        Ok(out)
    }

    async fn open_read(&self, folder: &str, name: &str) -> VaultResult<Box<dyn AsyncRead + Send + Unpin>> {
        let path = full_path(folder, name);
        let data = self
            .files
            .get(&path)
            .map(|e| e.value().clone())
            .ok_or_else(|| VaultError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path)))?;
        Ok(Box::new(MemoryReader { data, pos: 0 }))
    }

    async fn read_to_end(&self, folder: &str, name: &str) -> VaultResult<Bytes> {
        let path = full_path(folder, name);
        self.files
            .get(&path)
            .map(|e| e.value().clone())
            .ok_or_else(|| VaultError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path)))
    }

    async fn open_write(&self, folder: &str, name: &str) -> VaultResult<Box<dyn AsyncWrite + Send + Unpin>> {
        Ok(Box::new(MemoryWriter {
            files: self.files.clone(),
            path: full_path(folder, name),
            buf: Vec::new(),
            committed: false,
        }))
    }

    async fn write_bytes(&self, folder: &str, name: &str, bytes: Bytes) -> VaultResult<()> {
        self.files.insert(full_path(folder, name), bytes);
        Ok(())
    }

    async fn delete(&self, folder: &str, name: &str) -> VaultResult<()> {
        let path = full_path(folder, name);
        self.files.remove(&path);
        self.dirs.remove(&path);
        Ok(())
    }

    async fn create_subdir(&self, folder: &str, name: &str) -> VaultResult<()> {
        let path = full_path(folder, name);
        if !folder.is_empty() {
            self.dirs.insert(folder.to_string());
        }
        self.dirs.insert(path);
        Ok(())
    }

    async fn rename(&self, folder: &str, old_name: &str, new_name: &str) -> VaultResult<()> {
        let old_path = full_path(folder, old_name);
        let new_path = full_path(folder, new_name);
        if let Some((_, bytes)) = self.files.remove(&old_path) {
            self.files.insert(new_path, bytes);
            return Ok(());
        }
        if self.dirs.remove(&old_path).is_some() {
            self.dirs.insert(new_path);
            return Ok(());
        }
        Err(VaultError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, old_path)))
    }

    async fn exists(&self, folder: &str, name: &str) -> VaultResult<bool> {
        let path = full_path(folder, name);
        Ok(self.files.contains_key(&path) || self.dirs.contains(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_bytes_then_read_to_end_round_trips() {
        let store = MemoryStore::new();
        store.write_bytes("photos", "abc", Bytes::from_static(b"hello")).await.unwrap();
        let bytes = store.read_to_end("photos", "abc").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn enumerate_lists_direct_children_only() {
        let store = MemoryStore::new();
        store.write_bytes("", "root-file", Bytes::from_static(b"x")).await.unwrap();
        store.write_bytes("sub", "nested-file", Bytes::from_static(b"y")).await.unwrap();
        store.create_subdir("", "sub").await.unwrap();

        let root_entries = store.enumerate("").await.unwrap();
        let names: Vec<_> = root_entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"root-file"));
        assert!(names.contains(&"sub"));
        assert!(!names.contains(&"nested-file"));
    }

    #[tokio::test]
    async fn open_write_commits_on_shutdown() {
        let store = MemoryStore::new();
        let mut writer = store.open_write("", "streamed").await.unwrap();
        writer.write_all(b"streamed content").await.unwrap();
        writer.shutdown().await.unwrap();

        let bytes = store.read_to_end("", "streamed").await.unwrap();
        assert_eq!(&bytes[..], b"streamed content");
    }

    #[tokio::test]
    async fn open_read_streams_from_position_zero() {
        let store = MemoryStore::new();
        store.write_bytes("", "f", Bytes::from_static(b"abcdef")).await.unwrap();
        let mut reader = store.open_read("", "f").await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn rename_moves_a_file() {
        let store = MemoryStore::new();
        store.write_bytes("", "old", Bytes::from_static(b"data")).await.unwrap();
        store.rename("", "old", "new").await.unwrap();
        assert!(!store.exists("", "old").await.unwrap());
        assert_eq!(&store.read_to_end("", "new").await.unwrap()[..], b"data");
    }

    #[tokio::test]
    async fn delete_missing_entry_is_not_an_error() {
        let store = MemoryStore::new();
        store.delete("", "never-existed").await.unwrap();
    }
}
