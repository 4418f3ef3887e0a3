//! The record type returned by directory listings over an upload's raw tree.

/// Basic info about one element (file or folder) at a path relative to an
/// upload's raw root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPathInfo {
    pub path: String,
    pub is_file: bool,
    /// Byte size for files; -1 for directories.
    pub size: i64,
    pub access: &'static str,
}
