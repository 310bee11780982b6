use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use sv_core::{FileType, VaultError, VaultStore};
use sv_crypto::SecureArena;
use sv_index::VaultIndex;
use sv_store_memory::MemoryStore;
use tokio::sync::watch;

fn new_index() -> Arc<VaultIndex> {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    VaultIndex::new(store, Arc::new(SecureArena::new(false)))
}

#[tokio::test]
async fn add_and_remove_entry_semantics() {
    let index = new_index();
    index.load(b"pw").await.unwrap();

    index.add_entry(b"pw", "a".repeat(32), FileType::Image, "Vacation".to_string());
    assert_eq!(index.get_type(&"a".repeat(32)), FileType::Image.as_i32());
    assert_eq!(index.get_entry(&"a".repeat(32)).unwrap().folder_path, "Vacation");

    index.remove_entry(b"pw", &"a".repeat(32));
    assert_eq!(index.get_type(&"a".repeat(32)), -1);
    assert!(index.get_entry(&"a".repeat(32)).is_none());
}

#[tokio::test]
async fn save_then_clear_then_load_restores_entries() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    let index = VaultIndex::new(store, Arc::new(SecureArena::new(false)));
    index.load(b"badger").await.unwrap();

    index.add_entry(b"badger", "a".repeat(32), FileType::Image, "Vacation".to_string());
    index.add_entry(b"badger", "b".repeat(32), FileType::Video, "".to_string());
    index.add_entry(b"badger", "c".repeat(32), FileType::Text, "Notes/2026".to_string());
    index.save(b"badger").await.unwrap();

    index.clear();
    assert!(!index.is_loaded());
    index.load(b"badger").await.unwrap();

    assert!(index.is_loaded());
    assert_eq!(index.len(), 3);
    assert_eq!(index.get_type(&"a".repeat(32)), FileType::Image.as_i32());
    assert_eq!(index.get_entry(&"a".repeat(32)).unwrap().folder_path, "Vacation");
    assert_eq!(index.get_type(&"b".repeat(32)), FileType::Video.as_i32());
    assert_eq!(index.get_entry(&"c".repeat(32)).unwrap().folder_path, "Notes/2026");
}

#[tokio::test]
async fn debounced_autosave_persists_after_the_delay() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    let index = VaultIndex::new(store.clone(), Arc::new(SecureArena::new(false)));
    index.load(b"badger").await.unwrap();

    index.add_entry(b"badger", "a".repeat(32), FileType::Image, "".to_string());
    index.add_entry(b"badger", "d".repeat(32), FileType::Image, "".to_string());

    // Autosave is debounced 2s after the most recent mutation.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    index.clear();
    index.load(b"badger").await.unwrap();
    assert_eq!(index.len(), 2);
}

#[tokio::test]
async fn load_with_wrong_password_does_not_load() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    let index = VaultIndex::new(store, Arc::new(SecureArena::new(false)));
    index.load(b"correct").await.unwrap();
    index.add_entry(b"correct", "a".repeat(32), FileType::Image, "".to_string());
    index.save(b"correct").await.unwrap();
    index.clear();

    let result = index.load(b"incorrect").await;
    assert!(matches!(result, Err(VaultError::InvalidPassword)));
    assert!(!index.is_loaded());
}

#[tokio::test]
async fn load_on_an_empty_vault_succeeds_with_no_entries() {
    let index = new_index();
    index.load(b"pw").await.unwrap();
    assert!(index.is_loaded());
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn concurrent_load_calls_are_single_flight() {
    let index = new_index();
    let (a, b) = tokio::join!(index.load(b"pw"), index.load(b"pw"));
    a.unwrap();
    b.unwrap();
    assert!(index.is_loaded());
}

#[tokio::test]
async fn generate_discovers_blobs_not_yet_indexed() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    let password = b"badger";

    for name in ["a".repeat(32), "b".repeat(32)] {
        let plaintext = sv_format::BlobPlaintext {
            original_name: "x",
            file_type: FileType::Image,
            content_type: sv_core::ContentType::User("image/jpeg".into()),
            file: Some(b"data"),
            thumbnail: None,
            note: None,
        };
        let blob = sv_format::encrypt(password, &plaintext, sv_crypto::KdfAlgorithm::Argon2id).unwrap();
        store.write_bytes("", &name, bytes::Bytes::from(blob)).await.unwrap();
    }

    let index = VaultIndex::new(store, Arc::new(SecureArena::new(false)));
    index.load(password).await.unwrap();
    assert_eq!(index.len(), 0);

    let cancel = AtomicBool::new(false);
    let (tx, _rx) = watch::channel((0, 0));
    let count = index.generate(password, &cancel, &tx).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(index.get_type(&"a".repeat(32)), FileType::Image.as_i32());
}

#[tokio::test]
async fn generate_excludes_the_index_blob_itself() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryStore::new());
    let index = VaultIndex::new(store, Arc::new(SecureArena::new(false)));
    index.load(b"pw").await.unwrap();
    index.add_entry(b"pw", "a".repeat(32), FileType::Image, "".to_string());
    index.save(b"pw").await.unwrap();

    let cancel = AtomicBool::new(false);
    let (tx, _rx) = watch::channel((0, 0));
    let count = index.generate(b"pw", &cancel, &tx).await.unwrap();

    // The index blob itself (a `.`-prefixed name) is never a candidate, and
    // the already-present entry is skipped as incremental regeneration.
    assert_eq!(count, 1);
}
