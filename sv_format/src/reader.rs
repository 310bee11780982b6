//! Lazy per-section readers (§4.5, §9's "two reader variants behind a
//! common interface"). An AEAD blob's sections are already fully decrypted
//! in memory by the time they're exposed — ChaCha20-Poly1305 authenticates
//! the whole ciphertext in one shot, so there is no cheaper path — while a
//! streaming-mode blob decrypts only the chunks a caller actually reads,
//! skipping straight to a section's first chunk instead of walking every
//! chunk that precedes it.

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sv_core::VaultError;
use tokio::io::{AsyncRead, ReadBuf};

use crate::blob::{decrypt, locate_metadata_frame, resolve_key};
use crate::header::{BlobHeader, Mode, HEADER_LEN};
use crate::metadata::Metadata;
use crate::section::{MARKER_END, MARKER_FILE, MARKER_NOTE, MARKER_THUMBNAIL};

/// A blob opened for viewing: its metadata plus a lazy reader for each
/// section actually present.
pub struct SectionReaders {
    pub metadata: Metadata,
    pub file: Option<LazySection>,
    pub thumbnail: Option<LazySection>,
    pub note: Option<LazySection>,
}

/// One section's content, readable without requiring the whole blob to be
/// decrypted up front.
pub enum LazySection {
    /// The section's plaintext, already fully decrypted (AEAD mode).
    Buffered(Cursor<Vec<u8>>),
    /// The section's plaintext, decrypted chunk-by-chunk as it is read
    /// (streaming mode).
    Stream(StreamSectionReader),
}

impl AsyncRead for LazySection {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            LazySection::Buffered(cursor) => {
                let data = cursor.get_ref();
                let pos = cursor.position() as usize;
                if pos >= data.len() {
                    return Poll::Ready(Ok(()));
                }
                let take = buf.remaining().min(data.len() - pos);
                buf.put_slice(&data[pos..pos + take]);
                cursor.set_position((pos + take) as u64);
                Poll::Ready(Ok(()))
            }
            LazySection::Stream(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

/// Decrypts one streaming-mode chunk by absolute chunk index, computing its
/// ciphertext position directly (`chunks_start + index * stride`) rather
/// than scanning every preceding chunk — the random-access primitive that
/// makes jumping straight to a section's first chunk possible.
fn decrypt_chunk_at(
    key: &[u8; 32],
    stream_header: &[u8; sv_crypto::stream::STREAM_HEADER_LEN],
    chunks_start: usize,
    blob: &[u8],
    index: u64,
) -> Result<(Vec<u8>, bool), VaultError> {
    let full_chunk_ct_len = sv_crypto::stream::CHUNK_SIZE + sv_crypto::stream::CHUNK_OVERHEAD;
    let offset = chunks_start + index as usize * full_chunk_ct_len;
    let remaining = blob
        .len()
        .checked_sub(offset)
        .filter(|&r| r > 0)
        .ok_or_else(|| VaultError::CorruptFormat("chunk index past end of stream".into()))?;
    let take = remaining.min(full_chunk_ct_len);
    let chunk = &blob[offset..offset + take];
    let (plaintext, is_final) =
        sv_crypto::stream::decrypt_chunk(key, stream_header, index, chunk).map_err(|_| VaultError::InvalidPassword)?;
    if is_final && offset + take != blob.len() {
        return Err(VaultError::CorruptFormat(
            "data present after the final stream chunk".into(),
        ));
    }
    Ok((plaintext, is_final))
}

/// Decrypts the plaintext stream bytes in `[start, start + len)`, pulling in
/// only the chunks that range actually spans. Used to read the small
/// marker+size section headers that precede each payload.
fn read_plaintext_range(
    key: &[u8; 32],
    stream_header: &[u8; sv_crypto::stream::STREAM_HEADER_LEN],
    chunks_start: usize,
    blob: &[u8],
    start: u64,
    len: u64,
) -> Result<Vec<u8>, VaultError> {
    let mut out = Vec::with_capacity(len as usize);
    let mut abs = start;
    let end = start + len;
    while abs < end {
        let chunk_index = abs / sv_crypto::stream::CHUNK_SIZE as u64;
        let (plaintext, _is_final) = decrypt_chunk_at(key, stream_header, chunks_start, blob, chunk_index)?;
        let offset_in_chunk = (abs % sv_crypto::stream::CHUNK_SIZE as u64) as usize;
        let available = plaintext.len().saturating_sub(offset_in_chunk);
        if available == 0 {
            return Err(VaultError::CorruptFormat("stream ended while reading a section header".into()));
        }
        let take = available.min((end - abs) as usize);
        out.extend_from_slice(&plaintext[offset_in_chunk..offset_in_chunk + take]);
        abs += take as u64;
    }
    Ok(out)
}

/// A section's content inside a streaming-mode blob, decrypted one 64 KiB
/// chunk at a time as the caller reads it forward.
pub struct StreamSectionReader {
    key: [u8; 32],
    stream_header: [u8; sv_crypto::stream::STREAM_HEADER_LEN],
    chunks_start: usize,
    blob: Arc<[u8]>,
    section_start: u64,
    section_len: u64,
    pos: u64,
    buffered: Option<(u64, Vec<u8>, usize)>,
}

impl AsyncRead for StreamSectionReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.pos >= this.section_len {
            return Poll::Ready(Ok(()));
        }
        let abs = this.section_start + this.pos;
        let chunk_index = abs / sv_crypto::stream::CHUNK_SIZE as u64;
        let needs_refill = !matches!(&this.buffered, Some((idx, data, consumed)) if *idx == chunk_index && *consumed < data.len());
        if needs_refill {
            let (plaintext, _) =
                match decrypt_chunk_at(&this.key, &this.stream_header, this.chunks_start, &this.blob, chunk_index) {
                    Ok(v) => v,
                    Err(_) => {
                        return Poll::Ready(Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "stream chunk authentication failed",
                        )))
                    }
                };
            let offset_in_chunk = (abs % sv_crypto::stream::CHUNK_SIZE as u64) as usize;
            this.buffered = Some((chunk_index, plaintext, offset_in_chunk));
        }
        let (_, data, consumed) = this.buffered.as_mut().unwrap();
        let available_in_chunk = data.len() - *consumed;
        let remaining_in_section = (this.section_len - this.pos) as usize;
        let take = available_in_chunk.min(remaining_in_section).min(buf.remaining());
        buf.put_slice(&data[*consumed..*consumed + take]);
        *consumed += take;
        this.pos += take as u64;
        Poll::Ready(Ok(()))
    }
}

/// Opens a blob for viewing: parses the header and metadata, then returns a
/// lazy reader per present section. AEAD-mode blobs are decrypted in full
/// up front (no partial-authentication primitive exists for them);
/// streaming-mode blobs decrypt only the chunks each reader actually visits.
pub fn open_for_view(password: &[u8], blob: Vec<u8>) -> Result<SectionReaders, VaultError> {
    let header = BlobHeader::from_bytes(&blob)?;
    match header.mode {
        Mode::Aead => {
            let decrypted = decrypt(password, &blob)?;
            let (metadata, file, thumbnail, note) = decrypted.into_parts();
            Ok(SectionReaders {
                metadata,
                file: file.map(|b| LazySection::Buffered(Cursor::new(b))),
                thumbnail: thumbnail.map(|b| LazySection::Buffered(Cursor::new(b))),
                note: note.map(|b| LazySection::Buffered(Cursor::new(b))),
            })
        }
        Mode::Stream => open_for_view_stream(password, &header, blob),
    }
}

fn open_for_view_stream(password: &[u8], header: &BlobHeader, blob: Vec<u8>) -> Result<SectionReaders, VaultError> {
    let key = resolve_key(password, header)?;
    let (metadata, mut pos) = locate_metadata_frame(&key, &blob)?;

    let stream_header_end = HEADER_LEN + sv_crypto::stream::STREAM_HEADER_LEN;
    let stream_header: [u8; sv_crypto::stream::STREAM_HEADER_LEN] =
        blob[HEADER_LEN..stream_header_end].try_into().unwrap();
    let blob: Arc<[u8]> = Arc::from(blob.into_boxed_slice());

    let mut ranges = [None, None, None]; // FILE, THUMBNAIL, NOTE
    for (slot, present, expected_marker) in [
        (0, metadata.sections.file, MARKER_FILE),
        (1, metadata.sections.thumbnail, MARKER_THUMBNAIL),
        (2, metadata.sections.note, MARKER_NOTE),
    ] {
        if !present {
            continue;
        }
        let header_bytes = read_plaintext_range(&key, &stream_header, stream_header_end, &blob, pos, 5)?;
        let marker = header_bytes[0];
        if marker != expected_marker {
            return Err(VaultError::CorruptFormat(
                "section marker does not match the declared presence order".into(),
            ));
        }
        let size = u32::from_be_bytes(header_bytes[1..5].try_into().unwrap()) as u64;
        ranges[slot] = Some((pos + 5, size));
        pos += 5 + size;
    }
    let end_marker = read_plaintext_range(&key, &stream_header, stream_header_end, &blob, pos, 1)?;
    if end_marker[0] != MARKER_END {
        return Err(VaultError::CorruptFormat("missing section stream end marker".into()));
    }

    let make_reader = |range: Option<(u64, u64)>| {
        range.map(|(start, len)| {
            LazySection::Stream(StreamSectionReader {
                key,
                stream_header,
                chunks_start: stream_header_end,
                blob: blob.clone(),
                section_start: start,
                section_len: len,
                pos: 0,
                buffered: None,
            })
        })
    };

    Ok(SectionReaders {
        file: make_reader(ranges[0]),
        thumbnail: make_reader(ranges[1]),
        note: make_reader(ranges[2]),
        metadata,
    })
}
