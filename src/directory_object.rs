//! Directory variant of [`PathObject`](crate::path_object::PathObject), with
//! `join_file`/`join_subdir` helpers that inherit the parent's create policy.

use std::path::{Path, PathBuf};

use crate::path_object::PathObject;

/// A directory addressed by `(bucket, object_id)`, optionally created on
/// construction.
#[derive(Debug, Clone)]
pub struct DirectoryObject {
    os_path: PathBuf,
    create: bool,
}

impl DirectoryObject {
    /// Construct the directory at `bucket/object_id` (shard-prefixed per
    /// `prefix_size`), creating it (and any missing shard parent) iff `create`.
    pub fn new(bucket: &Path, object_id: &str, prefix_size: usize, create: bool) -> std::io::Result<Self> {
        let os_path = PathObject::new(bucket, object_id, prefix_size).os_path().to_path_buf();
        if create && !os_path.is_dir() {
            std::fs::create_dir_all(&os_path)?;
        }
        Ok(DirectoryObject { os_path, create })
    }

    /// Wrap an already-resolved directory path.
    pub fn at(os_path: impl Into<PathBuf>, create: bool) -> std::io::Result<Self> {
        let os_path = os_path.into();
        if create && !os_path.is_dir() {
            std::fs::create_dir_all(&os_path)?;
        }
        Ok(DirectoryObject { os_path, create })
    }

    pub fn os_path(&self) -> &Path {
        &self.os_path
    }

    pub fn exists(&self) -> bool {
        self.os_path.is_dir()
    }

    /// Join a subdirectory, inheriting this directory's create policy unless
    /// `create` is explicitly given.
    pub fn join_subdir(&self, rel: impl AsRef<Path>, create: Option<bool>) -> std::io::Result<DirectoryObject> {
        DirectoryObject::at(self.os_path.join(rel), create.unwrap_or(self.create))
    }

    /// Join a file path, creating any missing intermediate directories iff
    /// this directory's create policy is set.
    pub fn join_file(&self, rel: impl AsRef<Path>) -> std::io::Result<PathObject> {
        let rel = rel.as_ref();
        match rel.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                let dir = self.join_subdir(parent, None)?;
                let basename = rel.file_name().expect("non-empty relative file path");
                Ok(PathObject::at(dir.os_path().join(basename)))
            }
            None => Ok(PathObject::at(self.os_path.join(rel))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_file_creates_intermediate_dirs_when_create_is_set() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirectoryObject::at(tmp.path().join("upload"), true).unwrap();
        let file = dir.join_file("raw/sub/main.x").unwrap();
        assert!(file.os_path().parent().unwrap().is_dir());
    }

    #[test]
    fn join_file_does_not_create_dirs_when_create_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirectoryObject::at(tmp.path().join("upload"), false).unwrap();
        let file = dir.join_file("raw/sub/main.x").unwrap();
        assert!(!file.os_path().parent().unwrap().is_dir());
    }
}
