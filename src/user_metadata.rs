//! Submitter-supplied metadata co-located with a staging upload.
//!
//! The reference implementation serializes this with `pickle`; that choice is
//! explicitly rejected for any rewrite (DESIGN.md). This crate uses JSON via
//! `serde_json`, written through the atomic write-then-rename helper so a
//! crash mid-write never leaves a half-written metadata file behind.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const USER_METADATA_FILENAME: &str = "user_metadata.json";

/// Authorship, references, comments and embargo settings supplied by the
/// submitter at upload time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub embargo_length_months: u32,
}

impl UserMetadata {
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(UserMetadata::default());
        }
        let content = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_slice(&content).map_err(|e| CoreError::corrupt(path, e.to_string()))
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(self).expect("UserMetadata always serializes");
        atomic_write(path, &data).map_err(|e| CoreError::io(path, e))
    }
}

/// Writes `data` to `path` via the write-temp/sync/rename pattern: if the
/// process crashes mid-write, the original file is left untouched, and the
/// rename is atomic on POSIX filesystems.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&temp_path)?;
        std::io::Write::write_all(&mut file, data)?;
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
