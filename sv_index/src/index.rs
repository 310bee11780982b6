//! The vault index (C7): a process-wide, concurrently-readable map from
//! blob name to `(file_type, folder_path)`, persisted as its own encrypted
//! blob and kept in sync with a debounced autosave worker.
//!
//! Grounded on `dashmap::DashMap` for the entry map (already a teacher
//! dependency, used for `DirContext::registry_dir_handles`) and on
//! `s5_fs::spawn`'s `spawn_delayed` (`tokio::spawn` + `tokio::time::sleep`)
//! for the single-threaded autosave scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sv_core::{ContentType, EntryKind, FileType, VaultError, VaultResult, VaultStore};
use sv_crypto::{KdfAlgorithm, SecureArena};
use sv_folder::FolderNameCache;
use sv_format::BlobPlaintext;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::document::{EntryJson, IndexDocument, INDEX_DOCUMENT_VERSION};
use crate::entry::{is_blob_file_name, is_index_file_name, IndexEntry};

const AUTOSAVE_DELAY: Duration = Duration::from_secs(2);
const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexState {
    Empty,
    Loading,
    Loaded,
}

/// The in-memory vault index and its persistence/autosave machinery.
///
/// Vault-index operations need the unlock password to encrypt/decrypt the
/// index blob; per the engine's rule against singletons holding sensitive
/// state, `VaultIndex` never stores it — every method that may need to
/// read or write the index blob takes the password as an explicit
/// argument, including `add_entry`/`remove_entry`, which thread it through
/// to the autosave worker they schedule.
pub struct VaultIndex {
    store: Arc<dyn VaultStore>,
    arena: Arc<SecureArena>,
    map: DashMap<String, IndexEntry>,
    state: RwLock<IndexState>,
    blob_name: Mutex<Option<String>>,
    created_at: Mutex<Option<DateTime<Utc>>>,
    loaded_once: AtomicBool,
    dirty: AtomicBool,
    autosave: Mutex<Option<JoinHandle<()>>>,
    folder_name_cache: FolderNameCache,
}

impl std::fmt::Debug for VaultIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultIndex")
            .field("entries", &self.map.len())
            .field("state", &*self.state.read().expect("index state lock poisoned"))
            .finish()
    }
}

impl VaultIndex {
    pub fn new(store: Arc<dyn VaultStore>, arena: Arc<SecureArena>) -> Arc<Self> {
        Arc::new(Self {
            store,
            arena,
            map: DashMap::new(),
            state: RwLock::new(IndexState::Empty),
            blob_name: Mutex::new(None),
            created_at: Mutex::new(None),
            loaded_once: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            autosave: Mutex::new(None),
            folder_name_cache: FolderNameCache::new(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        *self.state.read().expect("index state lock poisoned") == IndexState::Loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get_entry(&self, name: &str) -> Option<IndexEntry> {
        self.map.get(name).map(|r| r.value().clone())
    }

    /// The entry's `fileType` as the raw integer the metadata JSON would
    /// carry, or `-1` if `name` is not present.
    pub fn get_type(&self, name: &str) -> i32 {
        self.map.get(name).map(|r| r.value().file_type.as_i32()).unwrap_or(-1)
    }

    /// Inserts or replaces an entry and schedules a debounced autosave.
    pub fn add_entry(
        self: &Arc<Self>,
        password: &[u8],
        name: impl Into<String>,
        file_type: FileType,
        folder_path: impl Into<String>,
    ) {
        self.map.insert(
            name.into(),
            IndexEntry {
                file_type,
                folder_path: folder_path.into(),
            },
        );
        self.schedule_autosave(password);
    }

    /// Removes an entry (a no-op if absent) and schedules a debounced
    /// autosave.
    pub fn remove_entry(self: &Arc<Self>, password: &[u8], name: &str) {
        self.map.remove(name);
        self.schedule_autosave(password);
    }

    /// Resolves a (possibly encrypted-token) folder path to a
    /// human-readable display path, caching decrypted segments.
    pub fn display_folder_path(&self, password: &[u8], folder_path: &str) -> String {
        if folder_path.is_empty() {
            return String::new();
        }
        folder_path
            .split('/')
            .map(|segment| self.display_segment(password, segment))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn display_segment(&self, password: &[u8], segment: &str) -> String {
        if let Some(cached) = self.folder_name_cache.get(segment) {
            return cached;
        }
        match sv_folder::decrypt_folder_name(segment, password) {
            Some(name) => {
                self.folder_name_cache.put(&self.arena, segment.to_string(), name.clone());
                name
            }
            None => segment.to_string(),
        }
    }

    /// Resets all in-memory state: the entry map, the loaded/dirty flags,
    /// the known index-blob name, the autosave timer, and the folder-name
    /// cache (the cache is now empty but re-registered via `clear()`'s own
    /// `put` calls going forward, per §4.7's clear contract).
    pub fn clear(&self) {
        self.map.clear();
        *self.state.write().expect("index state lock poisoned") = IndexState::Empty;
        *self.blob_name.lock().expect("index blob-name lock poisoned") = None;
        *self.created_at.lock().expect("index created-at lock poisoned") = None;
        self.loaded_once.store(false, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
        if let Some(handle) = self.autosave.lock().expect("autosave lock poisoned").take() {
            handle.abort();
        }
        self.folder_name_cache.clear();
    }

    /// Loads the index from the vault root. Single-flight: if a load is
    /// already in progress or has already completed, returns immediately.
    pub async fn load(&self, password: &[u8]) -> VaultResult<()> {
        {
            let mut state = self.state.write().expect("index state lock poisoned");
            match *state {
                IndexState::Loading | IndexState::Loaded => return Ok(()),
                IndexState::Empty => *state = IndexState::Loading,
            }
        }

        let result = self.load_inner(password).await;

        let mut state = self.state.write().expect("index state lock poisoned");
        *state = if result.is_ok() { IndexState::Loaded } else { IndexState::Empty };
        result
    }

    async fn load_inner(&self, password: &[u8]) -> VaultResult<()> {
        let entries = self.store.enumerate("").await?;
        let mut auth_failed = false;
        let mut found = None;

        for entry in entries {
            if entry.kind != EntryKind::File {
                continue;
            }
            if !(is_blob_file_name(&entry.name) || is_index_file_name(&entry.name)) {
                continue;
            }
            let bytes = match self.store.read_to_end("", &entry.name).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            match sv_format::decrypt(password, &bytes) {
                Ok(decrypted) if decrypted.content_type_string() == sv_core::INDEX_CONTENT_TYPE => {
                    let file = decrypted
                        .file_bytes()
                        .ok_or_else(|| VaultError::CorruptFormat("index blob has no FILE section".into()))?;
                    let doc: IndexDocument = serde_json::from_slice(file)
                        .map_err(|e| VaultError::CorruptFormat(format!("malformed index document: {e}")))?;
                    found = Some((entry.name, doc));
                    break;
                }
                Ok(_) => {}
                Err(VaultError::InvalidPassword) => auth_failed = true,
                Err(_) => {}
            }
        }

        match found {
            Some((name, doc)) => {
                self.map.clear();
                for (entry_name, ej) in doc.e {
                    self.map.insert(
                        entry_name,
                        IndexEntry {
                            file_type: FileType::from_i32(ej.t),
                            folder_path: ej.p,
                        },
                    );
                }
                *self.blob_name.lock().expect("index blob-name lock poisoned") = Some(name);
                *self.created_at.lock().expect("index created-at lock poisoned") = Some(doc.c);
                self.loaded_once.store(true, Ordering::SeqCst);
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            None if auth_failed => Err(VaultError::InvalidPassword),
            None => {
                self.map.clear();
                *self.blob_name.lock().expect("index blob-name lock poisoned") = None;
                self.loaded_once.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Serializes the current entries and writes a new index blob, deleting
    /// the previous one only after the new one is durably written.
    pub async fn save(&self, password: &[u8]) -> VaultResult<()> {
        let now = Utc::now();
        let created = {
            let mut guard = self.created_at.lock().expect("index created-at lock poisoned");
            *guard.get_or_insert(now)
        };

        let entries: HashMap<String, EntryJson> = self
            .map
            .iter()
            .map(|r| {
                (
                    r.key().clone(),
                    EntryJson {
                        t: r.value().file_type.as_i32(),
                        p: r.value().folder_path.clone(),
                    },
                )
            })
            .collect();

        let document = IndexDocument {
            v: INDEX_DOCUMENT_VERSION,
            c: created,
            u: now,
            e: entries,
        };
        let json = serde_json::to_vec(&document).expect("index document serializes to valid JSON");

        let plaintext = BlobPlaintext {
            original_name: "",
            file_type: FileType::Directory,
            content_type: ContentType::Index,
            file: Some(&json),
            thumbnail: None,
            note: None,
        };
        let blob = sv_format::encrypt(password, &plaintext, KdfAlgorithm::Argon2id)?;

        let new_name = generate_index_blob_name();
        self.store.write_bytes("", &new_name, Bytes::from(blob)).await?;

        let old_name = self
            .blob_name
            .lock()
            .expect("index blob-name lock poisoned")
            .replace(new_name);
        if let Some(old_name) = old_name {
            if let Err(err) = self.store.delete("", &old_name).await {
                tracing::warn!(error = %err, name = %old_name, "failed to delete superseded index blob");
            }
        }

        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn schedule_autosave(self: &Arc<Self>, password: &[u8]) {
        if !self.loaded_once.load(Ordering::SeqCst) {
            // Avoid persisting half-built state while the initial load/scan
            // is still in flight.
            return;
        }
        self.dirty.store(true, Ordering::SeqCst);

        let mut guard = self.autosave.lock().expect("autosave lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let this = Arc::clone(self);
        let password = Zeroizing::new(password.to_vec());
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(AUTOSAVE_DELAY).await;
            if let Err(err) = this.save(&password).await {
                tracing::warn!(error = %err, "debounced index autosave failed");
            }
        }));
    }

    /// A two-pass recursive regeneration of the index from the raw vault
    /// contents. Pass 1 enumerates every candidate blob; pass 2 probes each
    /// one not already present in the map and records its metadata.
    /// `cancel` is polled between directory entries, between candidates,
    /// and before each metadata probe; on cancellation a best-effort save
    /// persists whatever has accumulated and the current entry count is
    /// returned. `progress` is updated at most every 20 ms with
    /// `(processed, total)`.
    pub async fn generate(
        self: &Arc<Self>,
        password: &[u8],
        cancel: &AtomicBool,
        progress: &watch::Sender<(usize, usize)>,
    ) -> VaultResult<usize> {
        let candidates = self.collect_candidates(cancel).await?;
        let total = candidates.len();
        let processed = AtomicUsize::new(0);
        let _ = progress.send((0, total));
        let mut last_emit = Instant::now();

        for (folder, name) in candidates {
            if cancel.load(Ordering::SeqCst) {
                let _ = self.save(password).await;
                return Ok(self.map.len());
            }
            if self.map.contains_key(&name) {
                processed.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            if cancel.load(Ordering::SeqCst) {
                let _ = self.save(password).await;
                return Ok(self.map.len());
            }

            if let Ok(bytes) = self.store.read_to_end(&folder, &name).await {
                if let Ok(metadata) = sv_format::peek_metadata(password, &bytes) {
                    if metadata.content_type != ContentType::Index {
                        self.map.insert(
                            name,
                            IndexEntry {
                                file_type: metadata.file_type,
                                folder_path: folder,
                            },
                        );
                    }
                }
            }

            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            if last_emit.elapsed() >= PROGRESS_EMIT_INTERVAL || done == total {
                let _ = progress.send((done, total));
                last_emit = Instant::now();
            }
        }

        self.loaded_once.store(true, Ordering::SeqCst);
        self.save(password).await?;
        Ok(self.map.len())
    }

    async fn collect_candidates(&self, cancel: &AtomicBool) -> VaultResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(String::new());

        while let Some(folder) = queue.pop_front() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            for entry in self.store.enumerate(&folder).await? {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                match entry.kind {
                    EntryKind::Dir => {
                        let child = if folder.is_empty() {
                            entry.name
                        } else {
                            format!("{folder}/{}", entry.name)
                        };
                        queue.push_back(child);
                    }
                    EntryKind::File if is_blob_file_name(&entry.name) => {
                        out.push((folder.clone(), entry.name));
                    }
                    EntryKind::File => {}
                }
            }
        }
        Ok(out)
    }
}

fn generate_index_blob_name() -> String {
    format!(".{}", generate_blob_name())
}

/// A fresh 32-character alphanumeric blob name, the same shape
/// `import` uses for an ordinary (non-index) blob.
pub fn generate_blob_name() -> String {
    use rand::distr::Alphanumeric;
    use rand::Rng;
    rand::rng().sample_iter(Alphanumeric).take(32).map(char::from).collect()
}
