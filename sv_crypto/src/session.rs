//! The ephemeral session key (C2): a per-unlock 256-bit random value used
//! exclusively to invalidate host-level caches when the vault re-opens.

use std::sync::RwLock;

use rand::RngCore;
use rand_core::TryRngCore;
use zeroize::Zeroize;

/// Process-wide per-unlock key. The first access after construction or
/// `destroy()` lazily regenerates; `regenerate()`/`destroy()` serialize
/// against each other and against readers through a single `RwLock`.
pub struct SessionKey {
    material: RwLock<Option<[u8; 32]>>,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionKey {
    pub fn new() -> Self {
        Self {
            material: RwLock::new(None),
        }
    }

    /// Returns a 64-bit signature derived from the first 8 key bytes,
    /// lazily regenerating the key if it has never been created or was
    /// destroyed. Not sensitive: used only as a cache-invalidation tag,
    /// never for authentication.
    pub fn session_id(&self) -> u64 {
        self.ensure_valid();
        let guard = self.material.read().expect("session key lock poisoned");
        let key = guard.expect("ensure_valid just populated the key");
        u64::from_be_bytes(key[..8].try_into().unwrap())
    }

    /// Generates fresh key material, wiping whatever was previously stored.
    pub fn regenerate(&self) {
        let mut guard = self.material.write().expect("session key lock poisoned");
        if let Some(mut old) = guard.take() {
            old.zeroize();
        }
        let mut key = [0u8; 32];
        rand::rngs::OsRng.unwrap_mut().fill_bytes(&mut key);
        *guard = Some(key);
    }

    /// Wipes the current key material; the next `session_id()`/`ensure_valid()`
    /// call regenerates it.
    pub fn destroy(&self) {
        let mut guard = self.material.write().expect("session key lock poisoned");
        if let Some(mut old) = guard.take() {
            old.zeroize();
        }
    }

    /// Regenerates the key if none is currently present. A no-op otherwise.
    pub fn ensure_valid(&self) {
        {
            let guard = self.material.read().expect("session key lock poisoned");
            if guard.is_some() {
                return;
            }
        }
        self.regenerate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable_until_regenerate() {
        let key = SessionKey::new();
        let first = key.session_id();
        let second = key.session_id();
        assert_eq!(first, second);
    }

    #[test]
    fn regenerate_changes_the_signature_with_overwhelming_probability() {
        let key = SessionKey::new();
        let first = key.session_id();
        key.regenerate();
        let second = key.session_id();
        assert_ne!(first, second);
    }

    #[test]
    fn destroy_then_access_regenerates() {
        let key = SessionKey::new();
        let first = key.session_id();
        key.destroy();
        let second = key.session_id();
        assert_ne!(first, second);
    }
}
