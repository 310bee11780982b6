//! The section codec (C4): the reader/writer for the plaintext-side section
//! stream that every blob's ciphertext decrypts to.
//!
//! `marker:u8 ∥ size:u32-be ∥ payload`, markers in ascending numeric order,
//! each appearing at most once, terminated by the mandatory END marker.

use sv_core::VaultError;

pub const MARKER_FILE: u8 = 0x00;
pub const MARKER_THUMBNAIL: u8 = 0x01;
pub const MARKER_NOTE: u8 = 0x02;
pub const MARKER_END: u8 = 0xFF;

/// `(marker, payload size)` returned by [`SectionReader::read_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    pub marker: u8,
    pub size: u32,
}

/// Appends marker-prefixed, length-prefixed sections to an in-memory buffer
/// in ascending marker order. Sections must be written in `FILE`,
/// `THUMBNAIL`, `NOTE` order; `write_end` is mandatory and must be last.
#[derive(Debug, Default)]
pub struct SectionWriter {
    buf: Vec<u8>,
    last_marker: Option<u8>,
    ended: bool,
}

impl SectionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_file(&mut self, bytes: &[u8]) {
        self.write_section(MARKER_FILE, bytes);
    }

    pub fn write_thumbnail(&mut self, bytes: &[u8]) {
        self.write_section(MARKER_THUMBNAIL, bytes);
    }

    pub fn write_note(&mut self, bytes: &[u8]) {
        self.write_section(MARKER_NOTE, bytes);
    }

    pub fn write_end(&mut self) {
        self.buf.push(MARKER_END);
        self.ended = true;
    }

    fn write_section(&mut self, marker: u8, bytes: &[u8]) {
        debug_assert!(!self.ended, "cannot write a section after the end marker");
        debug_assert!(
            self.last_marker.is_none_or(|last| marker > last),
            "sections must be written in ascending marker order"
        );
        self.last_marker = Some(marker);
        self.buf.push(marker);
        self.buf
            .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads an ordered section stream back out, enforcing the §4.4 invariants.
pub struct SectionReader<'a> {
    data: &'a [u8],
    pos: usize,
    last_marker: Option<u8>,
    ended: bool,
}

impl<'a> SectionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            last_marker: None,
            ended: false,
        }
    }

    /// Reads the next marker+size pair, or `None` once the end marker has
    /// been consumed. Fails with `CorruptFormat` on an unknown marker,
    /// out-of-order/duplicate markers, or truncated input.
    pub fn read_next(&mut self) -> Result<Option<SectionInfo>, VaultError> {
        if self.ended {
            return Ok(None);
        }
        let marker = *self
            .data
            .get(self.pos)
            .ok_or_else(|| VaultError::CorruptFormat("truncated section stream: missing marker byte".into()))?;
        self.pos += 1;

        if marker == MARKER_END {
            self.ended = true;
            return Ok(None);
        }

        if !matches!(marker, MARKER_FILE | MARKER_THUMBNAIL | MARKER_NOTE) {
            return Err(VaultError::CorruptFormat(format!(
                "unknown section marker 0x{marker:02x}"
            )));
        }
        if let Some(last) = self.last_marker {
            if marker <= last {
                return Err(VaultError::CorruptFormat(
                    "section markers must be strictly ascending".into(),
                ));
            }
        }
        self.last_marker = Some(marker);

        let size_bytes = self.data.get(self.pos..self.pos + 4).ok_or_else(|| {
            VaultError::CorruptFormat("truncated section stream: missing size field".into())
        })?;
        let size = u32::from_be_bytes(size_bytes.try_into().unwrap());
        self.pos += 4;

        Ok(Some(SectionInfo { marker, size }))
    }

    /// Consumes and returns `size` bytes of payload following the most
    /// recent [`read_next`] call.
    pub fn read_content(&mut self, size: u32) -> Result<&'a [u8], VaultError> {
        let size = size as usize;
        let slice = self.data.get(self.pos..self.pos + size).ok_or_else(|| {
            VaultError::CorruptFormat("truncated section stream: payload shorter than declared size".into())
        })?;
        self.pos += size;
        Ok(slice)
    }

    /// Returns whether a mandatory END marker was consumed. A complete parse
    /// requires driving `read_next` until it returns `Ok(None)`; calling this
    /// before exhausting the stream reports `false`.
    pub fn reached_end(&self) -> bool {
        self.ended
    }
}
