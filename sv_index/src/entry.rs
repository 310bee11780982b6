//! Index entries and the two file-name shapes the index cares about: an
//! ordinary blob name and the `.`-prefixed index-blob name (§3 data model).

use sv_core::FileType;

/// One row of the in-memory vault index: `(file_type, folder_path)`, keyed
/// externally by the 32-character blob name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub file_type: FileType,
    pub folder_path: String,
}

fn is_alnum32(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// A plain blob name: exactly 32 alphanumeric characters, no leading dot.
pub fn is_blob_file_name(name: &str) -> bool {
    is_alnum32(name)
}

/// The index blob's own name: a leading `.` followed by 32 alphanumerics.
pub fn is_index_file_name(name: &str) -> bool {
    name.strip_prefix('.').is_some_and(is_alnum32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_index_file_names() {
        assert!(is_index_file_name(&format!(".{}", "a".repeat(32))));
        assert!(!is_index_file_name(&"a".repeat(32)));
        assert!(!is_index_file_name(&format!(".{}", "a".repeat(31))));
        assert!(!is_index_file_name(&format!(".{}!", "a".repeat(31))));
    }

    #[test]
    fn recognizes_blob_file_names() {
        assert!(is_blob_file_name(&"a1B2".repeat(8)));
        assert!(!is_blob_file_name(&format!(".{}", "a".repeat(32))));
        assert!(!is_blob_file_name("too-short"));
    }
}
