//! Secure memory, key lifecycle, and raw cryptographic primitives for the
//! vault engine: the secure-memory arena (C1), the ephemeral session key
//! (C2), the KDF provider (C3), and the AEAD/chunked-stream primitives that
//! `sv_format`'s blob codec (C5) builds on.

pub mod aead;
pub mod arena;
pub mod kdf;
pub mod session;
pub mod stream;

pub use arena::{secure_bytes, secure_string, SecureArena, SharedBytes, SharedString};
pub use kdf::{derive_key, KdfAlgorithm, KdfError};
pub use session::SessionKey;
