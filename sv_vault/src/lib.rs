//! The host-facing composed operations (§6): `import`, `open_for_view`,
//! `read_text`, `create_encrypted_folder`, and `list`, plus thin delegates
//! onto the vault index's own `query`/`regenerate`. Each composes the
//! lower-level crates (`sv_core`'s storage trait, `sv_crypto`'s KDF,
//! `sv_format`'s blob codec, `sv_folder`'s name codec, `sv_index`'s index)
//! into the surface a UI or CLI actually calls, the way `s5_fs::api::FS5`
//! composes `s5_core`'s actor and blob-store primitives into one facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use sv_core::{ContentType, EntryKind, FileType, VaultError, VaultResult, VaultStore};
use sv_crypto::{KdfAlgorithm, SecureArena};
use sv_format::{BlobPlaintext, SectionReaders};
use sv_index::VaultIndex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

const IMPORT_READ_CHUNK: usize = 256 * 1024;

/// The plaintext inputs to [`Vault::import`]. `src` supplies the FILE
/// section; `thumbnail`/`note` are already-materialized, since both are
/// small by construction (§4.5's own size budget never applies to them).
pub struct ImportRequest<'a> {
    pub original_name: &'a str,
    pub file_type: FileType,
    pub content_type: ContentType,
    pub thumbnail: Option<&'a [u8]>,
    pub note: Option<&'a [u8]>,
}

/// One gallery-facing listing entry (§6 `list(folder) -> [GalleryEntry]`).
/// A blob entry that fails to decrypt or parse (wrong password, corrupt,
/// unsupported version) is excluded rather than surfaced, per §7's
/// "unreadable blobs are excluded from listings" rule — callers that need
/// to know why should inspect the index instead.
#[derive(Debug, Clone)]
pub enum GalleryEntry {
    Folder { name: String, display_name: String },
    Blob { name: String, file_type: FileType, content_type: String, size: u64 },
}

/// Wraps a JoinError the way a task-local panic in `spawn_blocking` work
/// surfaces upstream: as an opaque I/O failure, since there is no other
/// kind in the taxonomy for "the blocking task itself died".
fn join_err(e: tokio::task::JoinError) -> VaultError {
    VaultError::Io(std::io::Error::other(e))
}

/// The host-facing vault: storage adapter, index, and secure-memory arena
/// bound together into the operations §6 names. Clone is cheap — every
/// field is already an `Arc`.
#[derive(Clone)]
pub struct Vault {
    store: Arc<dyn VaultStore>,
    index: Arc<VaultIndex>,
    arena: Arc<SecureArena>,
}

impl Vault {
    pub fn open(store: Arc<dyn VaultStore>, paranoid: bool) -> Self {
        let arena = Arc::new(SecureArena::new(paranoid));
        let index = VaultIndex::new(store.clone(), arena.clone());
        Self { store, index, arena }
    }

    pub fn index(&self) -> &Arc<VaultIndex> {
        &self.index
    }

    /// Reads `src` to completion, encrypts it under `password`, writes the
    /// resulting blob to `dst_folder`, and records it in the index.
    /// Returns the new blob's name. `cancel` is polled between reads of
    /// `src`; `progress` reports `(bytes_read, 0)` since the source's
    /// total length is not known ahead of EOF.
    pub async fn import(
        &self,
        mut src: impl AsyncRead + Unpin,
        dst_folder: &str,
        password: &[u8],
        request: ImportRequest<'_>,
        progress: &watch::Sender<(usize, usize)>,
        cancel: &AtomicBool,
    ) -> VaultResult<String> {
        let mut file = Vec::new();
        let mut chunk = vec![0u8; IMPORT_READ_CHUNK];
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(VaultError::Cancelled);
            }
            let n = src.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            file.extend_from_slice(&chunk[..n]);
            let _ = progress.send((file.len(), 0));
        }
        if cancel.load(Ordering::SeqCst) {
            return Err(VaultError::Cancelled);
        }

        let original_name = request.original_name.to_string();
        let content_type = request.content_type.clone();
        let thumbnail = request.thumbnail.map(|t| t.to_vec());
        let note = request.note.map(|n| n.to_vec());
        let file_type = request.file_type;
        let password_owned = password.to_vec();

        let blob = tokio::task::spawn_blocking(move || -> VaultResult<Vec<u8>> {
            let plaintext = BlobPlaintext {
                original_name: &original_name,
                file_type,
                content_type,
                file: Some(&file),
                thumbnail: thumbnail.as_deref(),
                note: note.as_deref(),
            };
            sv_format::encrypt(&password_owned, &plaintext, KdfAlgorithm::Argon2id)
        })
        .await
        .map_err(join_err)??;

        let name = sv_index::generate_blob_name();
        self.store.write_bytes(dst_folder, &name, Bytes::from(blob)).await?;
        self.index.add_entry(password, name.clone(), file_type, dst_folder);
        Ok(name)
    }

    /// Opens `folder/name` for per-section lazy reading (§4.5's view data
    /// flow). The KDF and, for streaming-mode blobs, the metadata-frame
    /// decrypt happen inside `spawn_blocking`; the returned readers then
    /// decrypt further chunks lazily as the caller polls them.
    pub async fn open_for_view(&self, folder: &str, name: &str, password: &[u8]) -> VaultResult<SectionReaders> {
        let bytes = self.store.read_to_end(folder, name).await?;
        let password_owned = password.to_vec();
        tokio::task::spawn_blocking(move || sv_format::open_for_view(&password_owned, bytes.to_vec()))
            .await
            .map_err(join_err)?
    }

    /// Fully decrypts `folder/name` and returns its FILE section as text.
    /// Intended for `FileType::Text` blobs; any FILE payload that is not
    /// valid UTF-8 is reported as `CorruptFormat` rather than lossily
    /// converted.
    pub async fn read_text(&self, folder: &str, name: &str, password: &[u8]) -> VaultResult<String> {
        let bytes = self.store.read_to_end(folder, name).await?;
        let password_owned = password.to_vec();
        tokio::task::spawn_blocking(move || -> VaultResult<String> {
            let decrypted = sv_format::decrypt(&password_owned, &bytes)?;
            let file = decrypted
                .file_bytes()
                .ok_or_else(|| VaultError::CorruptFormat("blob has no FILE section".into()))?;
            String::from_utf8(file.to_vec())
                .map_err(|_| VaultError::CorruptFormat("FILE section is not valid UTF-8".into()))
        })
        .await
        .map_err(join_err)?
    }

    /// Encrypts `name` into a folder-name token and creates it under
    /// `parent`. Returns the token, which is also the on-disk directory
    /// name `list` must later decrypt back for display.
    pub async fn create_encrypted_folder(&self, parent: &str, name: &str, password: &[u8]) -> VaultResult<String> {
        let name_owned = name.to_string();
        let password_owned = password.to_vec();
        let token = tokio::task::spawn_blocking(move || sv_folder::encrypt_folder_name(&name_owned, &password_owned))
            .await
            .map_err(join_err)??;
        self.store.create_subdir(parent, &token).await?;
        Ok(token)
    }

    /// Lists `folder`'s direct children as gallery entries: directories
    /// with their display name decrypted, blobs with their metadata
    /// peeked. The index's own document blob is never listed. A blob that
    /// fails to read or peek is silently excluded (§7).
    pub async fn list(&self, folder: &str, password: &[u8]) -> VaultResult<Vec<GalleryEntry>> {
        let entries = self.store.enumerate(folder).await?;
        let mut out = Vec::with_capacity(entries.len());

        for entry in entries {
            match entry.kind {
                EntryKind::Dir => {
                    let display_name = self.index.display_folder_path(password, &entry.name);
                    out.push(GalleryEntry::Folder { name: entry.name, display_name });
                }
                EntryKind::File => {
                    if sv_index::is_index_file_name(&entry.name) {
                        continue;
                    }
                    let Ok(bytes) = self.store.read_to_end(folder, &entry.name).await else {
                        continue;
                    };
                    let password_owned = password.to_vec();
                    let peeked = tokio::task::spawn_blocking(move || sv_format::peek_metadata(&password_owned, &bytes))
                        .await
                        .map_err(join_err)?;
                    let Ok(metadata) = peeked else {
                        continue;
                    };
                    if metadata.content_type == ContentType::Index {
                        continue;
                    }
                    out.push(GalleryEntry::Blob {
                        name: entry.name,
                        file_type: metadata.file_type,
                        content_type: metadata.content_type.as_str().to_string(),
                        size: entry.size,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Looks up an entry's recorded type/folder without touching storage.
    pub fn index_query(&self, name: &str) -> Option<sv_index::IndexEntry> {
        self.index.get_entry(name)
    }

    /// Rebuilds the index from the raw vault contents.
    pub async fn index_regenerate(
        &self,
        password: &[u8],
        progress: &watch::Sender<(usize, usize)>,
        cancel: &AtomicBool,
    ) -> VaultResult<usize> {
        self.index.generate(password, cancel, progress).await
    }

    /// Wipes the secure-memory arena and clears the in-memory index, per
    /// §9's lock data flow: "C1 wipes; C2 invalidates; C6 and C7 caches
    /// clear."
    pub fn lock(&self) {
        let index = self.index.clone();
        self.arena.full_cleanup(|| {
            index.clear();
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;
    use sv_store_memory::MemoryStore;

    fn vault() -> Vault {
        Vault::open(Arc::new(MemoryStore::new()), false)
    }

    fn request(name: &'static str, file_type: FileType) -> ImportRequest<'static> {
        ImportRequest {
            original_name: name,
            file_type,
            content_type: ContentType::User("test".into()),
            thumbnail: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn import_then_list_finds_the_blob() {
        let vault = vault();
        let (progress_tx, _progress_rx) = watch::channel((0, 0));
        let cancel = AtomicBool::new(false);

        let name = vault
            .import(
                Cursor::new(b"hello vault".to_vec()),
                "",
                b"hunter2",
                request("note.txt", FileType::Text),
                &progress_tx,
                &cancel,
            )
            .await
            .expect("import succeeds");

        let entries = vault.list("", b"hunter2").await.expect("list succeeds");
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            GalleryEntry::Blob { name: listed, file_type, .. } => {
                assert_eq!(listed, &name);
                assert_eq!(*file_type, FileType::Text);
            }
            other => panic!("expected a blob entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn import_then_read_text_round_trips() {
        let vault = vault();
        let (progress_tx, _progress_rx) = watch::channel((0, 0));
        let cancel = AtomicBool::new(false);

        let name = vault
            .import(
                Cursor::new(b"plain text payload".to_vec()),
                "",
                b"hunter2",
                request("note.txt", FileType::Text),
                &progress_tx,
                &cancel,
            )
            .await
            .expect("import succeeds");

        let text = vault.read_text("", &name, b"hunter2").await.expect("read_text succeeds");
        assert_eq!(text, "plain text payload");
    }

    #[tokio::test]
    async fn import_then_open_for_view_yields_the_file_section() {
        use tokio::io::AsyncReadExt as _;

        let vault = vault();
        let (progress_tx, _progress_rx) = watch::channel((0, 0));
        let cancel = AtomicBool::new(false);

        let name = vault
            .import(
                Cursor::new(b"viewable bytes".to_vec()),
                "",
                b"hunter2",
                request("photo.bin", FileType::Image),
                &progress_tx,
                &cancel,
            )
            .await
            .expect("import succeeds");

        let mut readers = vault.open_for_view("", &name, b"hunter2").await.expect("open_for_view succeeds");
        let mut file_reader = readers.file.take().expect("file section present");
        let mut out = Vec::new();
        file_reader.read_to_end(&mut out).await.expect("read succeeds");
        assert_eq!(out, b"viewable bytes");
    }

    #[tokio::test]
    async fn wrong_password_import_read_is_invalid_password() {
        let vault = vault();
        let (progress_tx, _progress_rx) = watch::channel((0, 0));
        let cancel = AtomicBool::new(false);

        let name = vault
            .import(
                Cursor::new(b"secret".to_vec()),
                "",
                b"right password",
                request("note.txt", FileType::Text),
                &progress_tx,
                &cancel,
            )
            .await
            .expect("import succeeds");

        let err = vault.read_text("", &name, b"wrong password").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPassword));
    }

    #[tokio::test]
    async fn create_encrypted_folder_is_listed_with_its_plaintext_name() {
        let vault = vault();
        let token = vault
            .create_encrypted_folder("", "Vacation Photos", b"hunter2")
            .await
            .expect("create_encrypted_folder succeeds");

        let entries = vault.list("", b"hunter2").await.expect("list succeeds");
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            GalleryEntry::Folder { name, display_name } => {
                assert_eq!(name, &token);
                assert_eq!(display_name, "Vacation Photos");
            }
            other => panic!("expected a folder entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn index_query_reflects_imported_entry() {
        let vault = vault();
        let (progress_tx, _progress_rx) = watch::channel((0, 0));
        let cancel = AtomicBool::new(false);

        let name = vault
            .import(
                Cursor::new(b"indexed".to_vec()),
                "",
                b"hunter2",
                request("note.txt", FileType::Text),
                &progress_tx,
                &cancel,
            )
            .await
            .expect("import succeeds");

        let entry = vault.index_query(&name).expect("entry recorded");
        assert_eq!(entry.file_type, FileType::Text);
        assert_eq!(entry.folder_path, "");
    }
}
