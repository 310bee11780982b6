//! The JSON document persisted inside the index blob's FILE section: `{v,
//! c, u, e}` (§3 data model, index blob).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INDEX_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryJson {
    pub t: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub p: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexDocument {
    pub v: u32,
    pub c: DateTime<Utc>,
    pub u: DateTime<Utc>,
    pub e: HashMap<String, EntryJson>,
}
