//! The encrypted folder-name codec (C6): encrypt/decrypt short folder names
//! into/out of a filesystem-safe base64url token, plus the cheap recognition
//! heuristic used before attempting a decrypt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use rand_core::TryRngCore;
use sv_core::VaultError;
use sv_crypto::{derive_key, KdfAlgorithm};

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const MAX_NAME_CODEPOINTS: usize = 30;

const MIN_TOKEN_LEN: usize = 60;
const MIN_DECODED_LEN: usize = 44;

/// Empirical structural check for "this could be one of our encrypted
/// folder names" (§3 folder-name token). A name failing this is never
/// handed to `decrypt_folder_name`; the caller displays it verbatim.
pub fn is_plausibly_encrypted(name: &str) -> bool {
    if name.len() < MIN_TOKEN_LEN {
        return false;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return false;
    }
    match URL_SAFE_NO_PAD.decode(name) {
        Ok(decoded) => decoded.len() >= MIN_DECODED_LEN,
        Err(_) => false,
    }
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.unwrap_mut().fill_bytes(&mut out);
    out
}

/// Encrypts `name` under `password` into a filesystem-safe token. `name` is
/// trimmed of surrounding whitespace before the length check; an empty or
/// over-long (> 30 codepoints) result is `ResourceLimit`.
pub fn encrypt_folder_name(name: &str, password: &[u8]) -> Result<String, VaultError> {
    let trimmed = name.trim();
    let codepoints = trimmed.chars().count();
    if codepoints == 0 || codepoints > MAX_NAME_CODEPOINTS {
        return Err(VaultError::ResourceLimit(format!(
            "folder name must be 1..={MAX_NAME_CODEPOINTS} codepoints after trimming, got {codepoints}"
        )));
    }

    let salt: [u8; SALT_LEN] = random_array();
    let iv: [u8; IV_LEN] = random_array();
    let key = derive_key(password, &salt, KdfAlgorithm::Argon2id).map_err(|e| VaultError::Kdf(e.to_string()))?;
    let ciphertext = sv_crypto::aead::encrypt(&key, &iv, &[], trimmed.as_bytes());

    let mut payload = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);

    Ok(URL_SAFE_NO_PAD.encode(payload))
}

/// Decrypts `token` under `password`. Returns `None` on any failure —
/// failed recognition, malformed base64, authentication failure, or a
/// plaintext that is not valid UTF-8 within the codepoint bound — so the
/// caller can fall back to displaying the token verbatim.
pub fn decrypt_folder_name(token: &str, password: &[u8]) -> Option<String> {
    if !is_plausibly_encrypted(token) {
        return None;
    }
    let decoded = URL_SAFE_NO_PAD.decode(token).ok()?;
    if decoded.len() < SALT_LEN + IV_LEN {
        return None;
    }
    let salt: [u8; SALT_LEN] = decoded[..SALT_LEN].try_into().ok()?;
    let iv: [u8; IV_LEN] = decoded[SALT_LEN..SALT_LEN + IV_LEN].try_into().ok()?;
    let ciphertext = &decoded[SALT_LEN + IV_LEN..];

    let key = derive_key(password, &salt, KdfAlgorithm::Argon2id).ok()?;
    let plaintext = sv_crypto::aead::decrypt(&key, &iv, &[], ciphertext).ok()?;
    let name = String::from_utf8(plaintext).ok()?;
    if name.is_empty() || name.chars().count() > MAX_NAME_CODEPOINTS {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_trimming() {
        let token = encrypt_folder_name("  My Photos  ", b"pw").unwrap();
        assert!(is_plausibly_encrypted(&token));
        assert_eq!(decrypt_folder_name(&token, b"pw").unwrap(), "My Photos");
    }

    #[test]
    fn empty_name_is_resource_limit() {
        assert!(matches!(
            encrypt_folder_name("", b"pw"),
            Err(VaultError::ResourceLimit(_))
        ));
        assert!(matches!(
            encrypt_folder_name("    ", b"pw"),
            Err(VaultError::ResourceLimit(_))
        ));
    }

    #[test]
    fn thirty_one_codepoints_is_resource_limit() {
        let name: String = std::iter::repeat_n('a', 31).collect();
        assert!(matches!(
            encrypt_folder_name(&name, b"pw"),
            Err(VaultError::ResourceLimit(_))
        ));
    }

    #[test]
    fn thirty_codepoints_is_accepted() {
        let name: String = std::iter::repeat_n('a', 30).collect();
        let token = encrypt_folder_name(&name, b"pw").unwrap();
        assert_eq!(decrypt_folder_name(&token, b"pw").unwrap(), name);
    }

    #[test]
    fn five_encryptions_of_the_same_name_are_distinct() {
        let tokens: Vec<String> = (0..5)
            .map(|_| encrypt_folder_name("Vacation", b"pw").unwrap())
            .collect();
        let distinct: std::collections::HashSet<_> = tokens.iter().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn wrong_password_fails_to_decrypt() {
        let token = encrypt_folder_name("Secrets", b"correct").unwrap();
        assert_eq!(decrypt_folder_name(&token, b"incorrect"), None);
    }

    #[test]
    fn a_plain_directory_name_fails_recognition() {
        assert!(!is_plausibly_encrypted("Vacation Photos"));
        assert!(!is_plausibly_encrypted("short"));
    }

    #[test]
    fn undecryptable_token_is_presented_verbatim() {
        // Structurally plausible (right length/alphabet) but not one of our
        // tokens: decoding succeeds, decrypting it must not.
        let bogus: String = "a".repeat(60);
        assert!(is_plausibly_encrypted(&bogus));
        assert_eq!(decrypt_folder_name(&bogus, b"pw"), None);
    }
}
