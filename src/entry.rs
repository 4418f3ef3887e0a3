//! The per-entry metadata stream consumed by `pack`/`re_pack`.

use serde::{Deserialize, Serialize};

/// Identifies one logical calculation within an upload, and the embargo
/// decision that governs which bucket its files and archive record land in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub entry_id: String,
    pub mainfile: String,
    pub with_embargo: bool,
}

impl EntryMetadata {
    pub fn new(entry_id: impl Into<String>, mainfile: impl Into<String>, with_embargo: bool) -> Self {
        EntryMetadata {
            entry_id: entry_id.into(),
            mainfile: mainfile.into(),
            with_embargo,
        }
    }
}
