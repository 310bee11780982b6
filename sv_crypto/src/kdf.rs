//! The KDF provider (C3): Argon2id (default) or PBKDF2-HMAC-SHA-512 (legacy),
//! both producing a 32-byte key. Grounded on the `argon2` and `pbkdf2` crates
//! as attested in the retrieval pack (`hambosto-sweetbyte-rs` uses `argon2`;
//! `TrustEdge-Labs-trustedge` uses `pbkdf2` with `sha2`).

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::Sha512;
use thiserror::Error;

pub const KEY_LEN: usize = 32;

pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
pub const ARGON2_ITERATIONS: u32 = 3;
pub const ARGON2_LANES: u32 = 4;

pub const PBKDF2_MIN_ITERATIONS: u32 = 20_000;
pub const PBKDF2_MAX_ITERATIONS: u32 = 500_000;
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 120_000;

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("argon2 key derivation failed: {0}")]
    Argon2(String),
    #[error("iteration count {0} outside the supported range [{PBKDF2_MIN_ITERATIONS}, {PBKDF2_MAX_ITERATIONS}]")]
    IterationsOutOfRange(u32),
}

/// Which KDF produced a blob's key, and with which cost parameter. Recorded
/// in the blob header's flag bits by `sv_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfAlgorithm {
    Argon2id,
    Pbkdf2HmacSha512 { iterations: u32 },
}

impl KdfAlgorithm {
    pub fn pbkdf2(iterations: u32) -> Result<Self, KdfError> {
        if !(PBKDF2_MIN_ITERATIONS..=PBKDF2_MAX_ITERATIONS).contains(&iterations) {
            return Err(KdfError::IterationsOutOfRange(iterations));
        }
        Ok(KdfAlgorithm::Pbkdf2HmacSha512 { iterations })
    }
}

/// Derives a 32-byte key from a UTF-8 password byte view and a 16-byte salt.
///
/// The caller owns the password buffer and is responsible for wiping it
/// (via `sv_crypto::arena`) once this call returns; the KDF never retains a
/// copy.
pub fn derive_key(
    password: &[u8],
    salt: &[u8; 16],
    algorithm: KdfAlgorithm,
) -> Result<[u8; KEY_LEN], KdfError> {
    match algorithm {
        KdfAlgorithm::Argon2id => derive_argon2id(password, salt),
        KdfAlgorithm::Pbkdf2HmacSha512 { iterations } => {
            Ok(derive_pbkdf2(password, salt, iterations))
        }
    }
}

fn derive_argon2id(password: &[u8], salt: &[u8; 16]) -> Result<[u8; KEY_LEN], KdfError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_LANES, Some(KEY_LEN))
        .map_err(|e| KdfError::Argon2(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| KdfError::Argon2(e.to_string()))?;
    Ok(out)
}

fn derive_pbkdf2(password: &[u8], salt: &[u8; 16], iterations: u32) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
    out
}
