//! Object-storage-like abstraction over paths on the local filesystem.
//!
//! Mirrors the reference implementation's `PathObject`: a `(bucket, object_id)`
//! pair resolved to an OS path, with optional hashed-prefix sharding so that a
//! bucket never accumulates more than a bounded number of entries per directory.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A single file or directory entry addressed by `(bucket, object_id)`.
#[derive(Debug, Clone)]
pub struct PathObject {
    os_path: PathBuf,
    /// Set when this object was constructed with prefix sharding enabled, so
    /// that `delete` can clean up the now-empty shard directory.
    shard_prefix_len: Option<usize>,
}

impl PathObject {
    /// Construct the object at `bucket/object_id`, optionally shard-prefixed:
    /// when `prefix_size > 0`, the final path segment `X` is expanded to
    /// `X[:prefix_size]/X`.
    pub fn new(bucket: &Path, object_id: &str, prefix_size: usize) -> Self {
        let mut os_path = bucket.join(object_id);
        let mut shard_prefix_len = None;
        if prefix_size > 0 {
            if let Some(last) = os_path.file_name().map(|n| n.to_string_lossy().into_owned()) {
                let cut = last.char_indices().nth(prefix_size).map(|(i, _)| i).unwrap_or(last.len());
                let shard = &last[..cut];
                let parent = os_path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
                os_path = parent.join(shard).join(&last);
                shard_prefix_len = Some(prefix_size);
            }
        }
        PathObject {
            os_path,
            shard_prefix_len,
        }
    }

    /// Wrap an already-resolved OS path with no sharding behavior attached.
    pub fn at(os_path: impl Into<PathBuf>) -> Self {
        PathObject {
            os_path: os_path.into(),
            shard_prefix_len: None,
        }
    }

    pub fn os_path(&self) -> &Path {
        &self.os_path
    }

    pub fn exists(&self) -> bool {
        self.os_path.exists()
    }

    pub fn size(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.os_path)?.len())
    }

    /// Removes the file or subtree at this path. If this object was
    /// constructed under prefix sharding and the shard directory is left
    /// empty, the shard directory is removed too — best-effort, failures are
    /// logged and never propagated.
    pub fn delete(&self) -> std::io::Result<()> {
        if self.os_path.is_dir() {
            std::fs::remove_dir_all(&self.os_path)?;
        } else {
            std::fs::remove_file(&self.os_path)?;
        }

        if let Some(prefix_len) = self.shard_prefix_len {
            if let Some(parent) = self.os_path.parent() {
                let parent_name = parent.file_name().map(|n| n.to_string_lossy().into_owned());
                let basename = self.os_path.file_name().map(|n| n.to_string_lossy().into_owned());
                if let (Some(parent_name), Some(basename)) = (parent_name, basename) {
                    if parent_name.chars().count() == prefix_len && basename.starts_with(&parent_name) {
                        match std::fs::read_dir(parent) {
                            Ok(mut entries) => {
                                if entries.next().is_none() {
                                    if let Err(e) = std::fs::remove_dir(parent) {
                                        warn!(directory = %parent.display(), error = %e, "could not remove empty prefix dir");
                                    } else {
                                        debug!(directory = %parent.display(), "removed empty prefix dir");
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(directory = %parent.display(), error = %e, "could not inspect prefix dir for cleanup");
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sharding_joins_plainly() {
        let obj = PathObject::new(Path::new("/bucket"), "upload-1", 0);
        assert_eq!(obj.os_path(), Path::new("/bucket/upload-1"));
    }

    #[test]
    fn sharding_expands_final_segment() {
        let obj = PathObject::new(Path::new("/bucket"), "abcdef", 2);
        assert_eq!(obj.os_path(), Path::new("/bucket/ab/abcdef"));
    }

    #[test]
    fn delete_removes_file_and_empty_shard_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let obj = PathObject::new(tmp.path(), "abcdef", 2);
        std::fs::create_dir_all(obj.os_path().parent().unwrap()).unwrap();
        std::fs::write(obj.os_path(), b"data").unwrap();

        obj.delete().unwrap();

        assert!(!obj.os_path().exists());
        assert!(!obj.os_path().parent().unwrap().exists());
    }
}
