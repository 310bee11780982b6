//! Single-shot ChaCha20-Poly1305 AEAD, used for small blobs (AEAD mode, C5)
//! and for folder-name encryption (C6). Grounded on the teacher's own direct
//! use of `chacha20poly1305` in `s5_fs::dir::{encrypt,decrypt}_dir_bytes`.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("AEAD authentication failed")]
pub struct AeadError;

/// Encrypts `plaintext` under `key`/`nonce`, binding `aad`. The returned
/// buffer has the 16-byte Poly1305 tag appended, matching the on-disk
/// layout described for AEAD-mode blobs.
pub fn encrypt(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(nonce.into(), Payload { msg: plaintext, aad })
        .expect("chacha20poly1305 encryption is infallible for valid key/nonce lengths")
}

/// Decrypts a ciphertext produced by [`encrypt`]. Any authentication
/// failure — wrong key, wrong AAD, or tampering — is reported uniformly as
/// [`AeadError`]; the caller maps this to `VaultError::InvalidPassword`.
pub fn decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
        .map_err(|_| AeadError)
}
