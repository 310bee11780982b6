//! Small value types shared across the metadata JSON and the vault index.

use serde::{Deserialize, Serialize};

/// The `fileType` integer recorded in a blob's metadata JSON.
///
/// Values outside the recognized range are preserved as `Reserved` rather
/// than rejected, since the metadata JSON contract requires unknown keys
/// (and, here, unknown enum values) to be tolerated on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory,
    Image,
    Gif,
    Video,
    Text,
    Reserved(u32),
}

impl FileType {
    pub fn as_i32(self) -> i32 {
        match self {
            FileType::Directory => 0,
            FileType::Image => 1,
            FileType::Gif => 2,
            FileType::Video => 3,
            FileType::Text => 4,
            FileType::Reserved(n) => n as i32,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => FileType::Directory,
            1 => FileType::Image,
            2 => FileType::Gif,
            3 => FileType::Video,
            4 => FileType::Text,
            other => FileType::Reserved(other.max(0) as u32),
        }
    }
}

impl Serialize for FileType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        Ok(FileType::from_i32(value))
    }
}

/// The `contentType` string recorded in a blob's metadata JSON.
///
/// `"INDEX"` is the one literal with engine-level meaning; everything else
/// is an opaque user payload marker and is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Index,
    User(String),
}

pub const INDEX_CONTENT_TYPE: &str = "INDEX";

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Index => INDEX_CONTENT_TYPE,
            ContentType::User(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == INDEX_CONTENT_TYPE {
            ContentType::Index
        } else {
            ContentType::User(s.to_string())
        }
    }
}

impl Serialize for ContentType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ContentType::from_str(&s))
    }
}
