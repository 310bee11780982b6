//! A process-local LRU cache from folder-name token to decrypted plaintext
//! (§4.6). Grounded on the `lru` crate, attested in the retrieval pack
//! (`saviornt-NexusLite`, `tvlfyi-tvix`, `vectordotdev-vector`). The cache
//! holds sensitive plaintext, so every value is a `sv_crypto::SharedString`
//! registered with the secure-memory arena (C1) at insertion time; `clear()`
//! drops the cache's own strong references, and a subsequent arena-wide
//! wipe zeroes anything still reachable through a surviving `Weak` handle.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sv_crypto::{secure_string, SecureArena, SharedString};

pub const CACHE_CAPACITY: usize = 100;

pub struct FolderNameCache {
    entries: Mutex<LruCache<String, SharedString>>,
}

impl std::fmt::Debug for FolderNameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderNameCache").finish_non_exhaustive()
    }
}

impl Default for FolderNameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderNameCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
        }
    }

    /// Returns the cached plaintext for `token`, if present, promoting it in
    /// the LRU order.
    pub fn get(&self, token: &str) -> Option<String> {
        let mut guard = self.lock();
        let shared = guard.get(token)?.clone();
        let value = match shared.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Some(value)
    }

    /// Inserts a freshly decrypted `(token, plaintext)` pair, registering the
    /// plaintext with `arena` so it participates in bulk wipes.
    pub fn put(&self, arena: &SecureArena, token: String, plaintext: String) {
        let shared = secure_string(plaintext);
        arena.register_string(&shared);
        self.lock().put(token, shared);
    }

    /// Drops every cached entry. Cleared on lock or password change (§4.6).
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, SharedString>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
