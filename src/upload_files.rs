//! Façade over the two concrete stores, for callers that only need read
//! access and don't care whether an upload is currently staging or public.

use crate::config::Config;
use crate::error::CoreResult;
use crate::public::PublicUploadFiles;
use crate::staging::StagingUploadFiles;
use crate::upload_path_info::UploadPathInfo;

pub trait UploadFiles {
    fn raw_path_exists(&self, path: &str) -> bool;
    fn raw_path_is_file(&self, path: &str) -> bool;
    fn raw_directory_list(&self, path: &str, recursive: bool, files_only: bool) -> Vec<UploadPathInfo>;
    fn raw_file_bytes(&self, path: &str) -> CoreResult<Vec<u8>>;
    fn raw_file_size(&self, path: &str) -> CoreResult<u64>;
    fn raw_file_manifest(&self, path_prefix: Option<&str>) -> Vec<String>;
    fn read_archive_record(&self, entry_id: &str) -> CoreResult<serde_json::Value>;

    /// Release any system resources (file handles) held by this store.
    fn close(&self) {}
}

impl UploadFiles for StagingUploadFiles {
    fn raw_path_exists(&self, path: &str) -> bool {
        StagingUploadFiles::raw_path_exists(self, path)
    }

    fn raw_path_is_file(&self, path: &str) -> bool {
        StagingUploadFiles::raw_path_is_file(self, path)
    }

    fn raw_directory_list(&self, path: &str, recursive: bool, files_only: bool) -> Vec<UploadPathInfo> {
        StagingUploadFiles::raw_directory_list(self, path, recursive, files_only)
    }

    fn raw_file_bytes(&self, path: &str) -> CoreResult<Vec<u8>> {
        use std::io::Read;
        let mut file = StagingUploadFiles::raw_file(self, path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| crate::error::CoreError::io(path, e))?;
        Ok(buf)
    }

    fn raw_file_size(&self, path: &str) -> CoreResult<u64> {
        StagingUploadFiles::raw_file_size(self, path)
    }

    fn raw_file_manifest(&self, path_prefix: Option<&str>) -> Vec<String> {
        StagingUploadFiles::raw_file_manifest(self, path_prefix)
    }

    fn read_archive_record(&self, entry_id: &str) -> CoreResult<serde_json::Value> {
        StagingUploadFiles::read_archive_record(self, entry_id)
    }
}

impl UploadFiles for PublicUploadFiles {
    fn raw_path_exists(&self, path: &str) -> bool {
        PublicUploadFiles::raw_path_exists(self, path)
    }

    fn raw_path_is_file(&self, path: &str) -> bool {
        PublicUploadFiles::raw_path_is_file(self, path)
    }

    fn raw_directory_list(&self, path: &str, recursive: bool, files_only: bool) -> Vec<UploadPathInfo> {
        PublicUploadFiles::raw_directory_list(self, path, recursive, files_only)
    }

    fn raw_file_bytes(&self, path: &str) -> CoreResult<Vec<u8>> {
        PublicUploadFiles::raw_file_bytes(self, path)
    }

    fn raw_file_size(&self, path: &str) -> CoreResult<u64> {
        PublicUploadFiles::raw_file_size(self, path)
    }

    fn raw_file_manifest(&self, path_prefix: Option<&str>) -> Vec<String> {
        PublicUploadFiles::raw_file_manifest(self, path_prefix)
    }

    fn read_archive_record(&self, entry_id: &str) -> CoreResult<serde_json::Value> {
        PublicUploadFiles::read_archive_record(self, entry_id, None)
    }

    fn close(&self) {
        PublicUploadFiles::close(self)
    }
}

/// Resolves an upload to whichever store currently holds it: staging takes
/// precedence, matching the reference implementation's lookup order.
pub enum UploadFilesHandle {
    Staging(StagingUploadFiles),
    Public(PublicUploadFiles),
}

impl UploadFilesHandle {
    pub fn get(config: &Config, upload_id: &str, access: crate::access::AccessPredicate) -> CoreResult<Self> {
        let staging_dir = crate::directory_object::DirectoryObject::new(&config.staging_root, upload_id, config.prefix_size, false)
            .map_err(|e| crate::error::CoreError::io(&config.staging_root, e))?;
        if staging_dir.exists() {
            return Ok(UploadFilesHandle::Staging(StagingUploadFiles::new(config, upload_id, access, false)?));
        }

        let public_dir = crate::directory_object::DirectoryObject::new(&config.public_root, upload_id, config.prefix_size, false)
            .map_err(|e| crate::error::CoreError::io(&config.public_root, e))?;
        if public_dir.exists() {
            return Ok(UploadFilesHandle::Public(PublicUploadFiles::new(config, upload_id, access)?));
        }

        Err(crate::error::CoreError::NotFound(upload_id.to_string()))
    }

    pub fn as_upload_files(&self) -> &dyn UploadFiles {
        match self {
            UploadFilesHandle::Staging(s) => s,
            UploadFilesHandle::Public(p) => p,
        }
    }
}
