//! The section codec (C4) and composite blob codec (C5) for the encrypted
//! vault format.

pub mod blob;
pub mod header;
pub mod metadata;
pub mod reader;
pub mod section;

pub use blob::{decrypt, encrypt, peek_metadata, BlobPlaintext, EncryptedBlob, AEAD_SIZE_THRESHOLD};
pub use header::{BlobHeader, HeaderKdf, Mode, BLOB_VERSION, HEADER_LEN};
pub use metadata::{Metadata, SectionPresence};
pub use reader::{open_for_view, LazySection, SectionReaders, StreamSectionReader};
pub use section::{SectionInfo, SectionReader, SectionWriter};
