//! The 36-byte unencrypted blob header: version, salt, IV/padding, and an
//! iteration-count-with-flags word.

use sv_core::VaultError;

pub const HEADER_LEN: usize = 36;
pub const BLOB_VERSION: u32 = 5;

pub const FLAG_AEAD: u32 = 1 << 31;
pub const FLAG_ARGON2: u32 = 1 << 30;
pub const FLAG_STREAM: u32 = 1 << 29;
const ITERATION_MASK: u32 = (1 << 29) - 1;

/// The blob's encryption mode, carried in the header's flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Aead,
    Stream,
}

/// Which KDF derived the blob's key, as recorded in the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKdf {
    Argon2id,
    Pbkdf2 { iterations: u32 },
}

/// The parsed, unencrypted preamble of a blob.
#[derive(Debug, Clone, Copy)]
pub struct BlobHeader {
    pub salt: [u8; 16],
    pub iv: [u8; 12],
    pub mode: Mode,
    pub kdf: HeaderKdf,
}

impl BlobHeader {
    pub fn new(salt: [u8; 16], iv: [u8; 12], mode: Mode, kdf: HeaderKdf) -> Self {
        Self { salt, iv, mode, kdf }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&BLOB_VERSION.to_be_bytes());
        out[4..20].copy_from_slice(&self.salt);
        out[20..32].copy_from_slice(&self.iv);

        let mut word = match self.mode {
            Mode::Aead => FLAG_AEAD,
            Mode::Stream => FLAG_STREAM,
        };
        match self.kdf {
            HeaderKdf::Argon2id => word |= FLAG_ARGON2,
            HeaderKdf::Pbkdf2 { iterations } => word |= iterations & ITERATION_MASK,
        }
        out[32..36].copy_from_slice(&word.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let bytes: &[u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| VaultError::CorruptFormat("blob shorter than the 36-byte header".into()))?
            .try_into()
            .unwrap();

        let version = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if version != BLOB_VERSION {
            return Err(VaultError::UnsupportedVersion {
                found: version,
                expected: BLOB_VERSION,
            });
        }

        let salt: [u8; 16] = bytes[4..20].try_into().unwrap();
        let iv: [u8; 12] = bytes[20..32].try_into().unwrap();
        let word = u32::from_be_bytes(bytes[32..36].try_into().unwrap());

        let is_aead = word & FLAG_AEAD != 0;
        let is_stream = word & FLAG_STREAM != 0;
        let mode = match (is_aead, is_stream) {
            (true, false) => Mode::Aead,
            (false, true) => Mode::Stream,
            _ => {
                return Err(VaultError::CorruptFormat(
                    "header must set exactly one of the AEAD/STREAM flags".into(),
                ))
            }
        };

        let kdf = if word & FLAG_ARGON2 != 0 {
            HeaderKdf::Argon2id
        } else {
            HeaderKdf::Pbkdf2 {
                iterations: word & ITERATION_MASK,
            }
        };

        Ok(Self { salt, iv, mode, kdf })
    }
}
