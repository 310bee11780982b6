//! A `VaultStore` (C8) implementation over the real filesystem. Grounded on
//! the teacher's `blob_stores::local::LocalStore`, adapted from a
//! content-hash keyspace to a vault-relative folder path plus file name;
//! atomic writes are grounded on `s5_fs::actor::persistence::save`'s
//! `NamedTempFile::new_in` + `persist` pattern.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use sv_core::{EntryKind, StoreEntry, VaultError, VaultResult, VaultStore};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    pub base_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn create(config: LocalStoreConfig) -> Self {
        Self {
            base_path: config.base_path,
        }
    }

    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve_component(component: &str) -> VaultResult<()> {
        if component.is_empty() || component.contains("..") || component.contains('/') || component.contains('\\') {
            return Err(VaultError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid path component: '{component}'"),
            )));
        }
        Ok(())
    }

    fn resolve_folder(&self, folder: &str) -> VaultResult<PathBuf> {
        let mut path = self.base_path.clone();
        if !folder.is_empty() {
            for component in folder.split('/') {
                Self::resolve_component(component)?;
                path.push(component);
            }
        }
        Ok(path)
    }

    fn resolve(&self, folder: &str, name: &str) -> VaultResult<PathBuf> {
        Self::resolve_component(name)?;
        Ok(self.resolve_folder(folder)?.join(name))
    }

    /// Atomically writes `bytes` to `path`: a temp file in the same
    /// directory, `fsync`, then rename over the destination.
    fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "destination has no parent directory")
        })?;
        std::fs::create_dir_all(parent)?;
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

struct LocalWriter {
    path: PathBuf,
    buf: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for LocalWriter {
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
            LocalStore::atomic_write(&this.path, &this.buf)?;
            this.committed = true;
        }
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl VaultStore for LocalStore {
    async fn enumerate(&self, folder: &str) -> VaultResult<Vec<StoreEntry>> {
        let dir = self.resolve_folder(folder)?;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VaultError::Io(e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            let kind = if metadata.is_dir() { EntryKind::Dir } else { EntryKind::File };
            let modified = metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
            out.push(StoreEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: metadata.len(),
                modified,
            });
        }
        Ok(out)
    }

    async fn open_read(&self, folder: &str, name: &str) -> VaultResult<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.resolve(folder, name)?;
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }

    async fn read_to_end(&self, folder: &str, name: &str) -> VaultResult<Bytes> {
        let path = self.resolve(folder, name)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(Bytes::from(bytes))
    }

    async fn open_write(&self, folder: &str, name: &str) -> VaultResult<Box<dyn AsyncWrite + Send + Unpin>> {
        let path = self.resolve(folder, name)?;
        Ok(Box::new(LocalWriter {
            path,
            buf: Vec::new(),
            committed: false,
        }))
    }

    async fn write_bytes(&self, folder: &str, name: &str, bytes: Bytes) -> VaultResult<()> {
        let path = self.resolve(folder, name)?;
        tokio::task::spawn_blocking(move || Self::atomic_write(&path, &bytes))
            .await
            .map_err(|e| VaultError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    async fn delete(&self, folder: &str, name: &str) -> VaultResult<()> {
        let path = self.resolve(folder, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    async fn create_subdir(&self, folder: &str, name: &str) -> VaultResult<()> {
        let path = self.resolve(folder, name)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn rename(&self, folder: &str, old_name: &str, new_name: &str) -> VaultResult<()> {
        let old_path = self.resolve(folder, old_name)?;
        let new_path = self.resolve(folder, new_name)?;
        tokio::fs::rename(&old_path, &new_path).await?;
        Ok(())
    }

    async fn exists(&self, folder: &str, name: &str) -> VaultResult<bool> {
        let path = self.resolve(folder, name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (LocalStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn write_bytes_then_read_to_end_round_trips() {
        let (store, _dir) = temp_store();
        store.write_bytes("", "abc", Bytes::from_static(b"hello")).await.unwrap();
        let bytes = store.read_to_end("", "abc").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn write_bytes_creates_intermediate_folders() {
        let (store, _dir) = temp_store();
        store.write_bytes("a/b", "f", Bytes::from_static(b"nested")).await.unwrap();
        let bytes = store.read_to_end("a/b", "f").await.unwrap();
        assert_eq!(&bytes[..], b"nested");
    }

    #[tokio::test]
    async fn enumerate_lists_files_and_dirs() {
        let (store, _dir) = temp_store();
        store.write_bytes("", "file-a", Bytes::from_static(b"x")).await.unwrap();
        store.create_subdir("", "subdir").await.unwrap();

        let entries = store.enumerate("").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"file-a"));
        assert!(names.contains(&"subdir"));
    }

    #[tokio::test]
    async fn rename_and_delete() {
        let (store, _dir) = temp_store();
        store.write_bytes("", "old", Bytes::from_static(b"data")).await.unwrap();
        store.rename("", "old", "new").await.unwrap();
        assert!(!store.exists("", "old").await.unwrap());
        assert!(store.exists("", "new").await.unwrap());

        store.delete("", "new").await.unwrap();
        assert!(!store.exists("", "new").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_entry_is_not_an_error() {
        let (store, _dir) = temp_store();
        store.delete("", "never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let (store, _dir) = temp_store();
        let result = store.write_bytes("../escape", "f", Bytes::from_static(b"x")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_write_commits_on_shutdown() {
        use tokio::io::AsyncWriteExt;
        let (store, _dir) = temp_store();
        let mut writer = store.open_write("", "streamed").await.unwrap();
        writer.write_all(b"streamed content").await.unwrap();
        writer.shutdown().await.unwrap();

        let bytes = store.read_to_end("", "streamed").await.unwrap();
        assert_eq!(&bytes[..], b"streamed content");
    }
}
