//! Staging store: the mutable working tree an upload lives in before it is
//! packed into a public upload.

mod ingest;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::access::AccessPredicate;
use crate::archive::{self, ArchiveReader};
use crate::config::Config;
use crate::directory_object::DirectoryObject;
use crate::error::{CoreError, CoreResult};
use crate::hashing;
use crate::path_object::PathObject;
use crate::raw_path;
use crate::upload_path_info::UploadPathInfo;
use crate::user_metadata::{UserMetadata, USER_METADATA_FILENAME};

pub use ingest::add_raw_files;

const FROZEN_FILENAME: &str = ".frozen";

/// Holds the raw tree, per-entry archive files, and frozen sentinel for one
/// upload under `<staging-root>/<shard>/<upload_id>/`.
pub struct StagingUploadFiles {
    upload_id: String,
    config: Config,
    root: DirectoryObject,
    raw_dir: DirectoryObject,
    archive_dir: DirectoryObject,
    frozen_file: PathObject,
    user_metadata_file: PathObject,
    access: AccessPredicate,
}

impl StagingUploadFiles {
    /// Opens (or, with `create`, creates) the staging store for `upload_id`.
    /// Fails with [`CoreError::NotFound`] if it does not exist and `create`
    /// is false.
    pub fn new(config: &Config, upload_id: &str, access: AccessPredicate, create: bool) -> CoreResult<Self> {
        let root = DirectoryObject::new(&config.staging_root, upload_id, config.prefix_size, create)
            .map_err(|e| CoreError::io(&config.staging_root, e))?;

        if !create && !root.exists() {
            return Err(CoreError::NotFound(upload_id.to_string()));
        }

        let raw_dir = root.join_subdir("raw", Some(create)).map_err(|e| CoreError::io(root.os_path(), e))?;
        let archive_dir = root.join_subdir("archive", Some(create)).map_err(|e| CoreError::io(root.os_path(), e))?;
        let frozen_file = root.join_file(FROZEN_FILENAME).map_err(|e| CoreError::io(root.os_path(), e))?;
        let user_metadata_file = root.join_file(USER_METADATA_FILENAME).map_err(|e| CoreError::io(root.os_path(), e))?;

        Ok(StagingUploadFiles {
            upload_id: upload_id.to_string(),
            config: config.clone(),
            root,
            raw_dir,
            archive_dir,
            frozen_file,
            user_metadata_file,
            access,
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &DirectoryObject {
        &self.root
    }

    pub fn raw_dir(&self) -> &DirectoryObject {
        &self.raw_dir
    }

    pub fn archive_dir(&self) -> &DirectoryObject {
        &self.archive_dir
    }

    /// True once this upload has been packed, or is being packed.
    pub fn is_frozen(&self) -> bool {
        self.frozen_file.exists()
    }

    fn require_not_frozen(&self) -> CoreResult<()> {
        if self.is_frozen() {
            return Err(CoreError::Frozen(self.upload_id.clone()));
        }
        Ok(())
    }

    fn require_authorized(&self) -> CoreResult<()> {
        if !(self.access)() {
            return Err(CoreError::Restricted(self.upload_id.clone()));
        }
        Ok(())
    }

    pub fn user_metadata(&self) -> CoreResult<UserMetadata> {
        UserMetadata::load(self.user_metadata_file.os_path())
    }

    pub fn set_user_metadata(&self, metadata: &UserMetadata) -> CoreResult<()> {
        metadata.save(self.user_metadata_file.os_path())
    }

    pub fn raw_path_exists(&self, path: &str) -> bool {
        if !raw_path::is_well_formed(path) {
            return false;
        }
        self.raw_dir.os_path().join(raw_path::strip_trailing_slash(path)).exists()
    }

    pub fn raw_path_is_file(&self, path: &str) -> bool {
        if !raw_path::is_well_formed(path) {
            return false;
        }
        self.raw_dir.os_path().join(raw_path::strip_trailing_slash(path)).is_file()
    }

    /// Lists the elements of `path` (a raw path denoting a directory),
    /// lexicographically sorted, recursing depth-first when `recursive`.
    pub fn raw_directory_list(&self, path: &str, recursive: bool, files_only: bool) -> Vec<UploadPathInfo> {
        let mut out = Vec::new();
        if !raw_path::is_well_formed(path) {
            return out;
        }
        self.list_into(raw_path::strip_trailing_slash(path), recursive, files_only, &mut out);
        out
    }

    fn list_into(&self, path: &str, recursive: bool, files_only: bool, out: &mut Vec<UploadPathInfo>) {
        let os_path = self.raw_dir.os_path().join(path);
        if !os_path.is_dir() {
            return;
        }
        let mut names: Vec<_> = match std::fs::read_dir(&os_path) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect(),
            Err(_) => return,
        };
        names.sort();

        for name in names {
            let element_raw_path = if path.is_empty() { name.clone() } else { format!("{path}/{name}") };
            let element_os_path = os_path.join(&name);
            let is_file = element_os_path.is_file();
            if !files_only || is_file {
                let size = if is_file { std::fs::metadata(&element_os_path).map(|m| m.len() as i64).unwrap_or(-1) } else { -1 };
                out.push(UploadPathInfo {
                    path: element_raw_path.clone(),
                    is_file,
                    size,
                    access: "unpublished",
                });
            }
            if recursive && !is_file {
                self.list_into(&element_raw_path, recursive, files_only, out);
            }
        }
    }

    pub fn raw_file_object(&self, path: &str) -> PathObject {
        PathObject::at(self.raw_dir.os_path().join(path))
    }

    pub fn raw_file(&self, path: &str) -> CoreResult<std::fs::File> {
        if !raw_path::is_well_formed(path) {
            return Err(CoreError::NotFound(path.to_string()));
        }
        self.require_authorized()?;
        let object = self.raw_file_object(path);
        std::fs::File::open(object.os_path()).map_err(|e| CoreError::io(object.os_path(), e))
    }

    pub fn raw_file_size(&self, path: &str) -> CoreResult<u64> {
        if !raw_path::is_well_formed(path) {
            return Err(CoreError::NotFound(path.to_string()));
        }
        self.require_authorized()?;
        self.raw_file_object(path).size().map_err(|e| CoreError::io(path, e))
    }

    /// Every raw file path under the raw tree, optionally filtered by prefix.
    pub fn raw_file_manifest(&self, path_prefix: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(self.raw_dir.os_path()).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(self.raw_dir.os_path()).unwrap();
            let rel = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            if path_prefix.map(|p| rel.starts_with(p)).unwrap_or(true) {
                out.push(rel);
            }
        }
        out
    }

    /// The mainfile followed by its sibling aux files (lexicographically
    /// sorted, capped at the configured cutoff when `with_cutoff`).
    pub fn calc_files(&self, mainfile: &str, with_mainfile: bool, with_cutoff: bool) -> CoreResult<Vec<String>> {
        let mainfile_object = self.raw_file_object(mainfile);
        if !mainfile_object.exists() {
            return Err(CoreError::NotFound(mainfile.to_string()));
        }

        let mainfile_basename = Path::new(mainfile).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let calc_dir = mainfile_object.os_path().parent().unwrap().to_path_buf();
        let calc_relative_dir = calc_dir.strip_prefix(self.raw_dir.os_path()).unwrap_or(&calc_dir).to_path_buf();

        let mut aux_files = Vec::new();
        let mut file_count = 0usize;
        let mut names: Vec<_> = std::fs::read_dir(&calc_dir)
            .map_err(|e| CoreError::io(&calc_dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        for name in names {
            if name == mainfile_basename {
                continue;
            }
            let full = calc_dir.join(&name);
            if !full.is_file() {
                continue;
            }
            let rel = calc_relative_dir.join(&name).to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            aux_files.push(rel);
            file_count += 1;
            if with_cutoff && file_count > self.config.auxfile_cutoff {
                break;
            }
        }
        aux_files.sort();

        if with_mainfile {
            let mut result = vec![mainfile.to_string()];
            result.extend(aux_files);
            Ok(result)
        } else {
            Ok(aux_files)
        }
    }

    pub fn calc_id(&self, mainfile: &str) -> String {
        hashing::calc_id(&self.upload_id, mainfile)
    }

    pub fn calc_hash(&self, mainfile: &str) -> CoreResult<String> {
        let files = self.calc_files(mainfile, true, true)?;
        let readers: Vec<std::io::Result<std::fs::File>> = files
            .iter()
            .map(|f| std::fs::File::open(self.raw_file_object(f).os_path()))
            .collect();
        hashing::calc_hash_of_files(readers).map_err(|e| CoreError::io(mainfile, e))
    }

    pub fn archive_file_object(&self, entry_id: &str) -> PathObject {
        PathObject::at(self.archive_dir.os_path().join(format!("{entry_id}.msg")))
    }

    /// Writes a single-entry archive record, returning its byte size. On
    /// failure the possibly-partial archive file is removed.
    pub fn write_archive_record(&self, entry_id: &str, value: &serde_json::Value) -> CoreResult<u64> {
        let object = self.archive_file_object(entry_id);
        let result = archive::write_archive(object.os_path(), vec![(entry_id.to_string(), value.clone())]);
        match result {
            Ok(()) => object.size().map_err(|e| CoreError::io(object.os_path(), e)),
            Err(e) => {
                if object.exists() {
                    let _ = object.delete();
                }
                Err(e)
            }
        }
    }

    pub fn read_archive_record(&self, entry_id: &str) -> CoreResult<serde_json::Value> {
        self.require_authorized()?;
        let object = self.archive_file_object(entry_id);
        if !object.exists() {
            return Err(CoreError::NotFound(entry_id.to_string()));
        }
        let mut reader = ArchiveReader::open(object.os_path())?;
        reader.get(entry_id)?.ok_or_else(|| CoreError::NotFound(entry_id.to_string()))
    }

    /// Merges the file, directory, zip, or tar(.gz) archive at `source` into
    /// the raw tree at `target_dir`. See [`ingest::add_raw_files`].
    pub fn add_raw_files(&self, source: &Path, target_dir: &str, move_source: bool) -> CoreResult<()> {
        self.require_not_frozen()?;
        if !raw_path::is_well_formed(target_dir) {
            return Err(CoreError::NotFound(target_dir.to_string()));
        }
        ingest::add_raw_files(&self.config, &self.raw_dir, source, target_dir, move_source)
    }

    /// Freezes the upload by writing the `.frozen` sentinel. Fails if already
    /// frozen.
    pub(crate) fn freeze(&self) -> CoreResult<()> {
        if self.is_frozen() {
            return Err(CoreError::Frozen(self.upload_id.clone()));
        }
        std::fs::write(self.frozen_file.os_path(), b"frozen").map_err(|e| CoreError::io(self.frozen_file.os_path(), e))?;
        info!(upload_id = %self.upload_id, "staging upload frozen");
        Ok(())
    }

    /// Removes the staging tree, and (unless `include_public` is false) the
    /// corresponding public tree.
    pub fn delete(&self, config: &Config, include_public: bool) -> CoreResult<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(self.root.os_path()).map_err(|e| CoreError::io(self.root.os_path(), e))?;
        }
        if include_public {
            let public_root = PathBuf::from(&config.public_root);
            if let Ok(public) = DirectoryObject::new(&public_root, &self.upload_id, config.prefix_size, false) {
                if public.exists() {
                    std::fs::remove_dir_all(public.os_path()).map_err(|e| CoreError::io(public.os_path(), e))?;
                }
            }
        }
        Ok(())
    }
}
