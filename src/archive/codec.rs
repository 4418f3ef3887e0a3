//! Self-indexed binary container mapping entry-id to an opaque archive
//! record, with O(1) lookup by entry-id on open.
//!
//! Layout (fixed by this crate — the distilled spec leaves the binary
//! format opaque, see SPEC_FULL.md §4.2):
//!
//! ```text
//! magic: b"NARC"
//! count: u32 LE                          -- number of records written
//! record[0..count]: MessagePack-encoded value, back to back
//! footer: for each record, in write order:
//!     entry_id_len: u32 LE
//!     entry_id: UTF-8 bytes
//!     offset:   u64 LE   -- byte offset of the record from start of file
//!     length:   u64 LE   -- byte length of the record
//! trailer: footer_offset: u64 LE          -- last 8 bytes of the file
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

const MAGIC: &[u8; 4] = b"NARC";

/// Writes `records` (in iteration order) to `path`. If writing fails partway
/// through, the partially-written file is deleted before the error is
/// propagated, so a reader never observes a half-written container.
pub fn write_archive<I>(path: &Path, records: I) -> CoreResult<()>
where
    I: IntoIterator<Item = (String, serde_json::Value)>,
{
    let temp_path = path.with_extension("msg.tmp");
    match write_archive_inner(&temp_path, records) {
        Ok(()) => {
            std::fs::rename(&temp_path, path).map_err(|e| CoreError::io(path, e))?;
            info!(path = %path.display(), "wrote archive container");
            Ok(())
        }
        Err(e) => {
            if temp_path.exists() {
                let _ = std::fs::remove_file(&temp_path);
            }
            Err(e)
        }
    }
}

fn write_archive_inner<I>(temp_path: &Path, records: I) -> CoreResult<()>
where
    I: IntoIterator<Item = (String, serde_json::Value)>,
{
    let file = File::create(temp_path).map_err(|e| CoreError::io(temp_path, e))?;
    let mut writer = BufWriter::new(file);

    let entries: Vec<(String, serde_json::Value)> = records.into_iter().collect();
    let count = entries.len() as u32;

    writer.write_all(MAGIC).map_err(|e| CoreError::io(temp_path, e))?;
    writer.write_all(&count.to_le_bytes()).map_err(|e| CoreError::io(temp_path, e))?;

    let mut offset = 8u64;
    let mut footer: Vec<(String, u64, u64)> = Vec::with_capacity(entries.len());

    for (entry_id, value) in entries {
        let encoded = rmp_serde::to_vec(&value).map_err(|e| CoreError::corrupt(temp_path, e.to_string()))?;
        writer.write_all(&encoded).map_err(|e| CoreError::io(temp_path, e))?;
        footer.push((entry_id, offset, encoded.len() as u64));
        offset += encoded.len() as u64;
    }

    let footer_start = offset;
    for (entry_id, rec_offset, rec_len) in &footer {
        let id_bytes = entry_id.as_bytes();
        writer
            .write_all(&(id_bytes.len() as u32).to_le_bytes())
            .map_err(|e| CoreError::io(temp_path, e))?;
        writer.write_all(id_bytes).map_err(|e| CoreError::io(temp_path, e))?;
        writer.write_all(&rec_offset.to_le_bytes()).map_err(|e| CoreError::io(temp_path, e))?;
        writer.write_all(&rec_len.to_le_bytes()).map_err(|e| CoreError::io(temp_path, e))?;
    }

    writer.write_all(&footer_start.to_le_bytes()).map_err(|e| CoreError::io(temp_path, e))?;
    writer.flush().map_err(|e| CoreError::io(temp_path, e))?;
    Ok(())
}

/// An opened archive container. Closing is idempotent; a closed reader
/// reports itself closed via [`ArchiveReader::is_closed`] so a caller (the
/// Public Store) can reopen on demand.
pub struct ArchiveReader {
    path: PathBuf,
    file: Option<File>,
    index: HashMap<String, (u64, u64)>,
    order: Vec<String>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let mut file = File::open(path).map_err(|e| CoreError::io(path, e))?;
        let file_len = file.metadata().map_err(|e| CoreError::io(path, e))?.len();

        if file_len < 8 {
            return Err(CoreError::corrupt(path, "file shorter than trailer"));
        }

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|e| CoreError::io(path, e))?;
        if &magic != MAGIC {
            return Err(CoreError::corrupt(path, "bad magic"));
        }
        let mut count_buf = [0u8; 4];
        file.read_exact(&mut count_buf).map_err(|e| CoreError::io(path, e))?;
        let count = u32::from_le_bytes(count_buf);

        file.seek(SeekFrom::End(-8)).map_err(|e| CoreError::io(path, e))?;
        let mut trailer = [0u8; 8];
        file.read_exact(&mut trailer).map_err(|e| CoreError::io(path, e))?;
        let footer_start = u64::from_le_bytes(trailer);

        if footer_start > file_len.saturating_sub(8) {
            return Err(CoreError::corrupt(path, "footer offset out of range"));
        }

        file.seek(SeekFrom::Start(footer_start)).map_err(|e| CoreError::io(path, e))?;
        let footer_len = file_len - 8 - footer_start;
        let mut footer_bytes = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_bytes).map_err(|e| CoreError::io(path, e))?;

        let mut index = HashMap::with_capacity(count as usize);
        let mut order = Vec::with_capacity(count as usize);
        let mut cursor = 0usize;
        while cursor < footer_bytes.len() {
            if cursor + 4 > footer_bytes.len() {
                return Err(CoreError::corrupt(path, "truncated footer entry"));
            }
            let id_len = u32::from_le_bytes(footer_bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            if cursor + id_len + 16 > footer_bytes.len() {
                return Err(CoreError::corrupt(path, "truncated footer entry"));
            }
            let entry_id = String::from_utf8(footer_bytes[cursor..cursor + id_len].to_vec())
                .map_err(|e| CoreError::corrupt(path, e.to_string()))?;
            cursor += id_len;
            let rec_offset = u64::from_le_bytes(footer_bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            let rec_len = u64::from_le_bytes(footer_bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;

            order.push(entry_id.clone());
            index.insert(entry_id, (rec_offset, rec_len));
        }

        if index.len() != count as usize {
            return Err(CoreError::corrupt(path, "footer entry count mismatch"));
        }

        debug!(path = %path.display(), records = count, "opened archive container");

        Ok(ArchiveReader {
            path: path.to_path_buf(),
            file: Some(file),
            index,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.index.contains_key(entry_id)
    }

    pub fn entry_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Lazily materializes the value for `entry_id`, or `None` if absent.
    pub fn get(&mut self, entry_id: &str) -> CoreResult<Option<serde_json::Value>> {
        let (offset, length) = match self.index.get(entry_id) {
            Some(pos) => *pos,
            None => return Ok(None),
        };
        let path = self.path.clone();
        let file = self.file.as_mut().ok_or_else(|| CoreError::corrupt(&path, "archive reader is closed"))?;

        file.seek(SeekFrom::Start(offset)).map_err(|e| CoreError::io(&path, e))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).map_err(|e| CoreError::io(&path, e))?;

        let value = rmp_serde::from_slice(&buf).map_err(|e| CoreError::corrupt(&path, e.to_string()))?;
        Ok(Some(value))
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Releases the underlying file handle. Idempotent.
    pub fn close(&mut self) {
        self.file = None;
    }
}
