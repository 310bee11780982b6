//! The JSON metadata object framed at the front of every section stream.

use serde::{Deserialize, Serialize};
use sv_core::{ContentType, FileType, VaultError};

/// Presence flags for the three optional sections, recorded in metadata so a
/// reader can check actual content against declared content (§4.5 mode
/// selection and the `sections` presence-mismatch invariant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPresence {
    #[serde(rename = "FILE")]
    pub file: bool,
    #[serde(rename = "THUMBNAIL", default)]
    pub thumbnail: bool,
    #[serde(rename = "NOTE", default)]
    pub note: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMetadata {
    #[serde(rename = "originalName", default)]
    original_name: String,
    #[serde(rename = "fileType")]
    file_type: i32,
    #[serde(rename = "contentType")]
    content_type: String,
    sections: SectionPresence,
    #[serde(flatten)]
    _unknown: serde_json::Map<String, serde_json::Value>,
}

/// The parsed metadata object. Unknown JSON keys are ignored on read, per
/// the metadata contract in §3.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub original_name: String,
    pub file_type: FileType,
    pub content_type: ContentType,
    pub sections: SectionPresence,
}

impl Metadata {
    pub fn new(
        original_name: impl Into<String>,
        file_type: FileType,
        content_type: ContentType,
        sections: SectionPresence,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            file_type,
            content_type,
            sections,
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        let raw = RawMetadata {
            original_name: self.original_name.clone(),
            file_type: self.file_type.as_i32(),
            content_type: self.content_type.as_str().to_string(),
            sections: self.sections,
            _unknown: serde_json::Map::new(),
        };
        serde_json::to_vec(&raw).expect("metadata serializes to valid JSON")
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let raw: RawMetadata = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::CorruptFormat(format!("malformed metadata JSON: {e}")))?;
        Ok(Self {
            original_name: raw.original_name,
            file_type: FileType::from_i32(raw.file_type),
            content_type: ContentType::from_str(&raw.content_type),
            sections: raw.sections,
        })
    }
}
