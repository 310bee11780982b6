//! The blob codec (C5): header + mode selection + the plaintext section
//! stream, tying together `sv_crypto`'s KDF and AEAD/stream primitives.

use rand::RngCore;
use rand_core::TryRngCore;
use sv_core::{ContentType, FileType, VaultError};
use sv_crypto::kdf::{derive_key, KdfAlgorithm};

use crate::header::{BlobHeader, HeaderKdf, Mode, HEADER_LEN};
use crate::metadata::{Metadata, SectionPresence};
use crate::section::{SectionReader, SectionWriter, MARKER_END, MARKER_FILE, MARKER_NOTE, MARKER_THUMBNAIL};

/// Plaintext content above which a blob is encrypted in streaming rather
/// than AEAD mode (§4.5 mode selection).
pub const AEAD_SIZE_THRESHOLD: u64 = 50 * 1024 * 1024;

const FRAME_MARKER: u8 = 0x0A;

/// The plaintext inputs to [`encrypt`]. Borrowed: the caller still owns (and
/// is responsible for wiping, via `sv_crypto::arena`) the underlying buffers.
pub struct BlobPlaintext<'a> {
    pub original_name: &'a str,
    pub file_type: FileType,
    pub content_type: ContentType,
    pub file: Option<&'a [u8]>,
    pub thumbnail: Option<&'a [u8]>,
    pub note: Option<&'a [u8]>,
}

/// A decrypted blob: metadata plus whichever sections were present.
#[derive(Debug, Clone)]
pub struct EncryptedBlob {
    metadata: Metadata,
    file: Option<Vec<u8>>,
    thumbnail: Option<Vec<u8>>,
    note: Option<Vec<u8>>,
}

impl EncryptedBlob {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn file_type(&self) -> FileType {
        self.metadata.file_type
    }

    pub fn content_type_string(&self) -> &str {
        self.metadata.content_type.as_str()
    }

    pub fn original_name(&self) -> &str {
        &self.metadata.original_name
    }

    pub fn file_bytes(&self) -> Option<&[u8]> {
        self.file.as_deref()
    }

    pub fn thumbnail_bytes(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn note_bytes(&self) -> Option<&[u8]> {
        self.note.as_deref()
    }

    /// Consumes the blob, handing its sections back as owned buffers. Used
    /// by [`crate::reader::open_for_view`] to wrap an already-materialized
    /// AEAD blob's sections in the same lazy-reader interface streaming-mode
    /// blobs use.
    pub(crate) fn into_parts(self) -> (Metadata, Option<Vec<u8>>, Option<Vec<u8>>, Option<Vec<u8>>) {
        (self.metadata, self.file, self.thumbnail, self.note)
    }
}

/// Maps a KDF failure onto the error taxonomy: an out-of-range iteration
/// count is a resource-limit violation (a corrupt or hostile header), never
/// a bespoke KDF error.
fn map_kdf_error(e: sv_crypto::KdfError) -> VaultError {
    match e {
        sv_crypto::KdfError::IterationsOutOfRange(n) => {
            VaultError::ResourceLimit(format!("PBKDF2 iteration count {n} outside the supported range"))
        }
        other @ sv_crypto::KdfError::Argon2(_) => VaultError::Kdf(other.to_string()),
    }
}

fn choose_kdf_header(algorithm: KdfAlgorithm) -> HeaderKdf {
    match algorithm {
        KdfAlgorithm::Argon2id => HeaderKdf::Argon2id,
        KdfAlgorithm::Pbkdf2HmacSha512 { iterations } => HeaderKdf::Pbkdf2 { iterations },
    }
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.unwrap_mut().fill_bytes(&mut out);
    out
}

/// Builds the plaintext section stream: `0x0A ∥ JSON(metadata) ∥ 0x0A ∥
/// sections ∥ END` (§4.5 step 3, §3 section-stream layout).
fn build_plaintext_stream(plaintext: &BlobPlaintext<'_>) -> Vec<u8> {
    let sections = SectionPresence {
        file: plaintext.file.is_some(),
        thumbnail: plaintext.thumbnail.is_some(),
        note: plaintext.note.is_some(),
    };
    let metadata = Metadata::new(
        plaintext.original_name,
        plaintext.file_type,
        plaintext.content_type.clone(),
        sections,
    );
    let metadata_json = metadata.to_json_bytes();

    let mut writer = SectionWriter::new();
    if let Some(file) = plaintext.file {
        writer.write_file(file);
    }
    if let Some(thumb) = plaintext.thumbnail {
        writer.write_thumbnail(thumb);
    }
    if let Some(note) = plaintext.note {
        writer.write_note(note);
    }
    writer.write_end();

    let sections = writer.into_bytes();
    let mut out = Vec::with_capacity(2 + metadata_json.len() + sections.len());
    out.push(FRAME_MARKER);
    out.extend_from_slice(&metadata_json);
    out.push(FRAME_MARKER);
    out.extend_from_slice(&sections);
    out
}

fn total_payload_len(plaintext: &BlobPlaintext<'_>) -> u64 {
    [plaintext.file, plaintext.thumbnail, plaintext.note]
        .into_iter()
        .flatten()
        .map(|b| b.len() as u64)
        .sum()
}

/// Encrypts `plaintext` under `password`, selecting AEAD or streaming mode
/// per §4.5, and returns the full on-disk blob bytes (header included).
pub fn encrypt(
    password: &[u8],
    plaintext: &BlobPlaintext<'_>,
    algorithm: KdfAlgorithm,
) -> Result<Vec<u8>, VaultError> {
    let salt: [u8; 16] = random_array();
    let key = derive_key(password, &salt, algorithm).map_err(map_kdf_error)?;
    let stream_plaintext = build_plaintext_stream(plaintext);
    let mode = if total_payload_len(plaintext) <= AEAD_SIZE_THRESHOLD {
        Mode::Aead
    } else {
        Mode::Stream
    };

    match mode {
        Mode::Aead => {
            let iv: [u8; 12] = random_array();
            let header = BlobHeader::new(salt, iv, Mode::Aead, choose_kdf_header(algorithm));
            let header_bytes = header.to_bytes();
            let ciphertext = sv_crypto::aead::encrypt(&key, &iv, &header_bytes, &stream_plaintext);

            let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
            out.extend_from_slice(&header_bytes);
            out.extend_from_slice(&ciphertext);
            Ok(out)
        }
        Mode::Stream => {
            let header = BlobHeader::new(salt, [0u8; 12], Mode::Stream, choose_kdf_header(algorithm));
            let header_bytes = header.to_bytes();
            let stream_header: [u8; sv_crypto::stream::STREAM_HEADER_LEN] = random_array();

            let mut out = Vec::with_capacity(
                HEADER_LEN
                    + stream_header.len()
                    + sv_crypto::stream::ciphertext_len(stream_plaintext.len() as u64) as usize,
            );
            out.extend_from_slice(&header_bytes);
            out.extend_from_slice(&stream_header);

            let chunks = stream_plaintext.chunks(sv_crypto::stream::CHUNK_SIZE);
            let chunk_count = sv_crypto::stream::chunk_count(stream_plaintext.len() as u64);
            let mut index = 0u64;
            let mut produced_any = false;
            for chunk in chunks {
                produced_any = true;
                let is_final = index + 1 == chunk_count;
                out.extend_from_slice(&sv_crypto::stream::encrypt_chunk(
                    &key,
                    &stream_header,
                    index,
                    is_final,
                    chunk,
                ));
                index += 1;
            }
            if !produced_any {
                // Zero-length plaintext: chunk_count is still 1, emit the
                // single, empty, FINAL chunk.
                out.extend_from_slice(&sv_crypto::stream::encrypt_chunk(
                    &key,
                    &stream_header,
                    0,
                    true,
                    &[],
                ));
            }
            Ok(out)
        }
    }
}

/// Parses the plaintext section stream produced by [`build_plaintext_stream`]
/// into a [`Metadata`] object and the raw section payloads.
fn parse_plaintext_stream(stream: &[u8]) -> Result<EncryptedBlob, VaultError> {
    if stream.first() != Some(&FRAME_MARKER) {
        return Err(VaultError::CorruptFormat("missing leading metadata frame marker".into()));
    }
    let json_end = stream[1..]
        .iter()
        .position(|&b| b == FRAME_MARKER)
        .ok_or_else(|| VaultError::CorruptFormat("missing trailing metadata frame marker".into()))?
        + 1;
    let metadata = Metadata::from_json_bytes(&stream[1..json_end])?;
    let rest = &stream[json_end + 1..];

    let mut reader = SectionReader::new(rest);
    let mut file = None;
    let mut thumbnail = None;
    let mut note = None;

    while let Some(info) = reader.read_next()? {
        let content = reader.read_content(info.size)?.to_vec();
        match info.marker {
            MARKER_FILE => file = Some(content),
            MARKER_THUMBNAIL => thumbnail = Some(content),
            MARKER_NOTE => note = Some(content),
            MARKER_END => unreachable!("read_next never yields the end marker"),
            _ => return Err(VaultError::CorruptFormat("unknown section marker".into())),
        }
    }

    let actual = SectionPresence {
        file: file.is_some(),
        thumbnail: thumbnail.is_some(),
        note: note.is_some(),
    };
    if actual != metadata.sections {
        return Err(VaultError::CorruptFormat(
            "declared section presence does not match actual content".into(),
        ));
    }

    Ok(EncryptedBlob {
        metadata,
        file,
        thumbnail,
        note,
    })
}

/// Resolves the header's recorded KDF choice and derives the blob key.
/// Shared by [`decrypt`], [`peek_metadata_stream`], and
/// [`crate::reader::open_for_view`].
pub(crate) fn resolve_key(password: &[u8], header: &BlobHeader) -> Result<[u8; 32], VaultError> {
    let algorithm = match header.kdf {
        HeaderKdf::Argon2id => KdfAlgorithm::Argon2id,
        HeaderKdf::Pbkdf2 { iterations } => KdfAlgorithm::pbkdf2(iterations).map_err(map_kdf_error)?,
    };
    derive_key(password, &header.salt, algorithm).map_err(map_kdf_error)
}

/// Decrypts a full on-disk blob under `password`. Authentication failure —
/// wrong password or tampering — is reported uniformly as `InvalidPassword`.
pub fn decrypt(password: &[u8], blob: &[u8]) -> Result<EncryptedBlob, VaultError> {
    let header = BlobHeader::from_bytes(blob)?;
    let key = resolve_key(password, &header)?;

    let stream_plaintext = match header.mode {
        Mode::Aead => {
            let ciphertext = &blob[HEADER_LEN..];
            sv_crypto::aead::decrypt(&key, &header.iv, &blob[..HEADER_LEN], ciphertext)
                .map_err(|_| VaultError::InvalidPassword)?
        }
        Mode::Stream => {
            let stream_header_end = HEADER_LEN + sv_crypto::stream::STREAM_HEADER_LEN;
            let stream_header: [u8; sv_crypto::stream::STREAM_HEADER_LEN] = blob
                .get(HEADER_LEN..stream_header_end)
                .ok_or_else(|| VaultError::CorruptFormat("truncated stream header".into()))?
                .try_into()
                .unwrap();

            let mut plaintext = Vec::new();
            let mut pos = stream_header_end;
            let mut index = 0u64;
            let mut saw_final = false;
            let full_chunk_ct_len = sv_crypto::stream::CHUNK_SIZE + sv_crypto::stream::CHUNK_OVERHEAD;

            while pos < blob.len() {
                let remaining = blob.len() - pos;
                let take = if remaining > full_chunk_ct_len {
                    full_chunk_ct_len
                } else {
                    remaining
                };
                let chunk = &blob[pos..pos + take];
                let (chunk_plaintext, is_final) = sv_crypto::stream::decrypt_chunk(&key, &stream_header, index, chunk)
                    .map_err(|_| VaultError::InvalidPassword)?;
                plaintext.extend_from_slice(&chunk_plaintext);
                pos += take;
                index += 1;
                if is_final {
                    saw_final = true;
                    if pos != blob.len() {
                        return Err(VaultError::CorruptFormat(
                            "data present after the final stream chunk".into(),
                        ));
                    }
                }
            }
            if !saw_final {
                return Err(VaultError::InvalidPassword);
            }
            plaintext
        }
    };

    parse_plaintext_stream(&stream_plaintext)
}

/// Reads only enough of `blob` to recover its metadata, without
/// materializing any section payload. AEAD mode has no partial-authentication
/// primitive (ChaCha20-Poly1305 validates the whole ciphertext in one shot),
/// so an AEAD blob is still decrypted in full here. Streaming-mode chunks
/// authenticate independently, so this stops as soon as the metadata JSON
/// frame closes — well before the FILE/THUMBNAIL/NOTE payloads, which is
/// exactly the large-file case the optimization exists for. Presence itself
/// never requires reading section content: `sections` is part of the
/// metadata JSON, written ahead of the section stream.
pub fn peek_metadata(password: &[u8], blob: &[u8]) -> Result<Metadata, VaultError> {
    let header = BlobHeader::from_bytes(blob)?;
    match header.mode {
        Mode::Aead => decrypt(password, blob).map(|b| b.metadata),
        Mode::Stream => peek_metadata_stream(password, &header, blob),
    }
}

/// The `Mode::Stream` half of [`peek_metadata`]: decrypts chunks from the
/// start of the stream and returns as soon as the metadata frame's closing
/// marker is found, never touching the chunks that carry section payloads.
fn peek_metadata_stream(password: &[u8], header: &BlobHeader, blob: &[u8]) -> Result<Metadata, VaultError> {
    let key = resolve_key(password, header)?;
    locate_metadata_frame(&key, blob).map(|(metadata, _end)| metadata)
}

/// Decrypts chunks from the start of a streaming-mode blob's ciphertext
/// until the metadata frame's closing marker is found, returning the parsed
/// metadata and the absolute plaintext offset (measured from the start of
/// the plaintext stream, i.e. position zero right after `FRAME_MARKER`'s
/// opening byte) at which the section stream begins. Used by both
/// [`peek_metadata_stream`] and [`crate::reader::open_for_view`].
pub(crate) fn locate_metadata_frame(key: &[u8; 32], blob: &[u8]) -> Result<(Metadata, u64), VaultError> {
    let stream_header_end = HEADER_LEN + sv_crypto::stream::STREAM_HEADER_LEN;
    let stream_header: [u8; sv_crypto::stream::STREAM_HEADER_LEN] = blob
        .get(HEADER_LEN..stream_header_end)
        .ok_or_else(|| VaultError::CorruptFormat("truncated stream header".into()))?
        .try_into()
        .unwrap();

    let full_chunk_ct_len = sv_crypto::stream::CHUNK_SIZE + sv_crypto::stream::CHUNK_OVERHEAD;
    let mut plaintext = Vec::new();
    let mut pos = stream_header_end;
    let mut index = 0u64;

    loop {
        if pos >= blob.len() {
            return Err(VaultError::CorruptFormat(
                "stream ended before the metadata frame was complete".into(),
            ));
        }
        let remaining = blob.len() - pos;
        let take = if remaining > full_chunk_ct_len { full_chunk_ct_len } else { remaining };
        let chunk = &blob[pos..pos + take];
        let (chunk_plaintext, is_final) = sv_crypto::stream::decrypt_chunk(key, &stream_header, index, chunk)
            .map_err(|_| VaultError::InvalidPassword)?;
        pos += take;
        index += 1;

        let already_had = plaintext.len();
        plaintext.extend_from_slice(&chunk_plaintext);

        if already_had == 0 && plaintext.first() != Some(&FRAME_MARKER) {
            return Err(VaultError::CorruptFormat("missing leading metadata frame marker".into()));
        }
        if let Some(rel) = plaintext[1..].iter().position(|&b| b == FRAME_MARKER) {
            let metadata = Metadata::from_json_bytes(&plaintext[1..rel + 1])?;
            return Ok((metadata, (rel + 2) as u64));
        }

        if is_final {
            return Err(VaultError::CorruptFormat("missing trailing metadata frame marker".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::ContentType;

    fn plaintext_of<'a>(file: Option<&'a [u8]>, thumb: Option<&'a [u8]>, note: Option<&'a [u8]>) -> BlobPlaintext<'a> {
        BlobPlaintext {
            original_name: "photo.jpg",
            file_type: FileType::Image,
            content_type: ContentType::User("image/jpeg".into()),
            file,
            thumbnail: thumb,
            note,
        }
    }

    #[test]
    fn aead_round_trip_tiny_payload() {
        let plaintext = plaintext_of(Some(b"Hello"), None, None);
        let blob = encrypt(b"badger", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let decrypted = decrypt(b"badger", &blob).unwrap();
        assert_eq!(decrypted.file_bytes(), Some(&b"Hello"[..]));
        assert_eq!(decrypted.thumbnail_bytes(), None);
        assert_eq!(decrypted.note_bytes(), None);
    }

    #[test]
    fn streaming_round_trip_multi_chunk() {
        // Crosses the AEAD/stream threshold so the codec picks streaming
        // mode and the chunked cipher produces more than one chunk.
        let payload = vec![0xABu8; (AEAD_SIZE_THRESHOLD + 1) as usize];
        let plaintext = plaintext_of(Some(&payload), None, None);
        let blob = encrypt(b"p", &plaintext, KdfAlgorithm::pbkdf2(20_000).unwrap()).unwrap();

        let header = BlobHeader::from_bytes(&blob).unwrap();
        assert_eq!(header.mode, Mode::Stream);
        assert!(sv_crypto::stream::chunk_count(payload.len() as u64) > 1);

        let decrypted = decrypt(b"p", &blob).unwrap();
        assert_eq!(decrypted.file_bytes(), Some(&payload[..]));
    }

    #[test]
    fn thumbnail_and_note_presence_and_order() {
        let file = vec![0xA5u8; 1000];
        let thumb = vec![0x5Au8; 200];
        let note = b"keepsafe";
        let plaintext = plaintext_of(Some(&file), Some(&thumb), Some(note));
        let blob = encrypt(b"pw", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let decrypted = decrypt(b"pw", &blob).unwrap();

        assert_eq!(decrypted.file_bytes(), Some(&file[..]));
        assert_eq!(decrypted.thumbnail_bytes(), Some(&thumb[..]));
        assert_eq!(decrypted.note_bytes(), Some(&note[..]));
        assert!(decrypted.metadata().sections.file);
        assert!(decrypted.metadata().sections.thumbnail);
        assert!(decrypted.metadata().sections.note);
    }

    #[test]
    fn wrong_password_is_invalid_password() {
        let plaintext = plaintext_of(Some(b"secret"), None, None);
        let blob = encrypt(b"correct", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let result = decrypt(b"incorrect", &blob);
        assert!(matches!(result, Err(VaultError::InvalidPassword)));
    }

    #[test]
    fn bit_flip_after_version_field_is_invalid_password() {
        let plaintext = plaintext_of(Some(b"secret"), None, None);
        let mut blob = encrypt(b"pw", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let flip_at = blob.len() - 1;
        blob[flip_at] ^= 0x01;
        assert!(matches!(decrypt(b"pw", &blob), Err(VaultError::InvalidPassword)));
    }

    #[test]
    fn truncated_streaming_blob_fails() {
        let payload = vec![0xCC; 200_000];
        let plaintext = plaintext_of(Some(&payload), None, None);
        let blob = encrypt(b"p", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let truncated = &blob[..blob.len() - 10];
        assert!(decrypt(b"p", truncated).is_err());
    }

    #[test]
    fn peek_metadata_streaming_mode_matches_full_decrypt() {
        let payload = vec![0xDDu8; (AEAD_SIZE_THRESHOLD + 1) as usize];
        let plaintext = plaintext_of(Some(&payload), Some(b"thumb"), None);
        let blob = encrypt(b"p", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        assert_eq!(BlobHeader::from_bytes(&blob).unwrap().mode, Mode::Stream);

        let metadata = peek_metadata(b"p", &blob).unwrap();
        assert!(metadata.sections.file);
        assert!(metadata.sections.thumbnail);
        assert!(!metadata.sections.note);
        assert_eq!(metadata.original_name, "photo.jpg");
    }

    #[test]
    fn peek_metadata_aead_mode_matches_full_decrypt() {
        let plaintext = plaintext_of(Some(b"Hello"), None, None);
        let blob = encrypt(b"badger", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        let metadata = peek_metadata(b"badger", &blob).unwrap();
        assert!(metadata.sections.file);
    }

    #[test]
    fn peek_metadata_streaming_mode_wrong_password_is_invalid() {
        let payload = vec![0xEEu8; (AEAD_SIZE_THRESHOLD + 1) as usize];
        let plaintext = plaintext_of(Some(&payload), None, None);
        let blob = encrypt(b"correct", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        assert!(matches!(
            peek_metadata(b"incorrect", &blob),
            Err(VaultError::InvalidPassword)
        ));
    }

    #[test]
    fn out_of_range_pbkdf2_iterations_is_resource_limit() {
        let plaintext = plaintext_of(Some(b"x"), None, None);
        let mut blob = encrypt(b"pw", &plaintext, KdfAlgorithm::pbkdf2(20_000).unwrap()).unwrap();
        // Header word: bit31 AEAD, bit30 ARGON2 (clear = pbkdf2), bits0-28 iterations.
        // Overwrite it to claim an out-of-range iteration count.
        blob[32] = 0b1000_0000; // AEAD flag set, ARGON2 clear, top iteration bits zero
        blob[33] = 0;
        blob[34] = 0;
        blob[35] = 1; // iterations = 1, well below PBKDF2_MIN_ITERATIONS
        assert!(matches!(decrypt(b"pw", &blob), Err(VaultError::ResourceLimit(_))));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let plaintext = plaintext_of(Some(b"x"), None, None);
        let mut blob = encrypt(b"pw", &plaintext, KdfAlgorithm::Argon2id).unwrap();
        blob[3] = 9;
        assert!(matches!(
            decrypt(b"pw", &blob),
            Err(VaultError::UnsupportedVersion { found: 9, expected: 5 })
        ));
    }
}
