//! The fixed error taxonomy shared by every component of the vault engine.
//!
//! Internal composition within a component uses `anyhow::Result` with
//! `.context(...)`, the way `s5_fs` composes its own internal errors; at the
//! boundary of a crate, errors are converted into this closed set of kinds so
//! callers can match on a taxonomy rather than parse error strings.

use thiserror::Error;

/// The result type returned at the public boundary of every vault crate.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Authentication failed during AEAD/stream decrypt, or the recognition
    /// test passed but decryption of a folder name failed. Used for both a
    /// truly wrong password and tampering — the distinction is not
    /// observable by design.
    #[error("invalid password")]
    InvalidPassword,

    /// Header fields outside specification, an unknown section marker, a
    /// missing end marker, a mismatched section size, malformed JSON
    /// metadata, out-of-order/duplicate markers, or a `sections` presence
    /// mismatch.
    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    /// Header version did not equal the one version this engine understands.
    #[error("unsupported blob version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A storage-adapter failure, wrapped verbatim.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// The KDF implementation failed outside of steady state.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// A folder name exceeded 30 codepoints (or was empty after trimming),
    /// or an iteration count fell outside `[20_000, 500_000]`.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// A cooperative cancellation flag was observed.
    #[error("operation cancelled")]
    Cancelled,
}
