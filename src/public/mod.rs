//! Public store: the immutable, zip/archive-backed published form of an
//! upload, as laid out in `<public-root>/<shard>/<upload_id>/`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::access::{always_restricted, AccessPredicate};
use crate::archive::ArchiveReader;
use crate::config::Config;
use crate::directory_object::DirectoryObject;
use crate::error::{CoreError, CoreResult};
use crate::raw_path;
use crate::upload_path_info::UploadPathInfo;

const ACCESS_BUCKETS: [&str; 2] = ["public", "restricted"];

/// One entry in the lazily-built directory view: either a file (with size)
/// or a subdirectory marker.
type DirectoryView = HashMap<String, HashMap<String, UploadPathInfo>>;

/// Holds the four published files for one upload and the caches built to
/// serve reads against them efficiently.
pub struct PublicUploadFiles {
    upload_id: String,
    config: Config,
    root: DirectoryObject,
    access: AccessPredicate,
    directories: OnceCell<DirectoryView>,
    raw_zips: Mutex<HashMap<String, zip::ZipArchive<File>>>,
    archives: Mutex<HashMap<String, ArchiveReader>>,
}

impl PublicUploadFiles {
    pub fn new(config: &Config, upload_id: &str, access: AccessPredicate) -> CoreResult<Self> {
        let root = DirectoryObject::new(&config.public_root, upload_id, config.prefix_size, false).map_err(|e| CoreError::io(&config.public_root, e))?;
        if !root.exists() {
            return Err(CoreError::NotFound(upload_id.to_string()));
        }
        Ok(PublicUploadFiles {
            upload_id: upload_id.to_string(),
            config: config.clone(),
            root,
            access,
            directories: OnceCell::new(),
            raw_zips: Mutex::new(HashMap::new()),
            archives: Mutex::new(HashMap::new()),
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn root(&self) -> &DirectoryObject {
        &self.root
    }

    fn authorized(&self) -> bool {
        (self.access)()
    }

    pub fn raw_zip_path(&self, access: &str, suffix: &str) -> PathBuf {
        raw_zip_path_in(self.root.os_path(), access, suffix)
    }

    pub fn archive_msg_path(&self, access: &str, suffix: &str) -> PathBuf {
        archive_msg_path_in(self.root.os_path(), &self.config, access, suffix)
    }

    /// Builds the directory view once, from both access buckets' raw zips.
    fn directories(&self) -> &DirectoryView {
        self.directories.get_or_init(|| {
            let mut view: DirectoryView = HashMap::new();
            for access in ACCESS_BUCKETS {
                let path = self.raw_zip_path(access, "");
                let Ok(file) = File::open(&path) else { continue };
                let Ok(mut archive) = zip::ZipArchive::new(file) else { continue };
                for i in 0..archive.len() {
                    let Ok(entry) = archive.by_index_raw(i) else { continue };
                    let name = entry.name().to_string();
                    let size = entry.size();
                    if entry.is_dir() {
                        continue;
                    }
                    register_path(&mut view, &name, size, access);
                }
            }
            view
        })
    }

    pub fn raw_path_exists(&self, path: &str) -> bool {
        if !raw_path::is_well_formed(path) {
            return false;
        }
        let explicit_dir = path.ends_with('/');
        let stripped = raw_path::strip_trailing_slash(path);
        let (dirname, basename) = split_path(stripped);

        if basename.is_empty() {
            return self.directories().contains_key(stripped);
        }
        if let Some(content) = self.directories().get(&dirname) {
            if let Some(info) = content.get(&basename) {
                if info.access == "public" || self.authorized() {
                    if explicit_dir && info.is_file {
                        return false;
                    }
                    return true;
                }
            }
        }
        false
    }

    pub fn raw_path_is_file(&self, path: &str) -> bool {
        if !raw_path::is_well_formed(path) {
            return false;
        }
        let stripped = raw_path::strip_trailing_slash(path);
        let (dirname, basename) = split_path(stripped);
        if basename.is_empty() {
            return false;
        }
        if let Some(content) = self.directories().get(&dirname) {
            if let Some(info) = content.get(&basename) {
                if info.access == "public" || self.authorized() {
                    return info.is_file;
                }
            }
        }
        false
    }

    pub fn raw_directory_list(&self, path: &str, recursive: bool, files_only: bool) -> Vec<UploadPathInfo> {
        let mut out = Vec::new();
        if !raw_path::is_well_formed(path) {
            return out;
        }
        let stripped = raw_path::strip_trailing_slash(path);
        self.list_into(stripped, recursive, files_only, &mut out);
        out
    }

    fn list_into(&self, path: &str, recursive: bool, files_only: bool, out: &mut Vec<UploadPathInfo>) {
        let Some(content) = self.directories().get(path) else { return };
        let mut entries: Vec<_> = content.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (_, info) in entries {
            if (info.access == "public" || self.authorized()) && (!files_only || info.is_file) {
                out.push(info.clone());
            }
            if recursive && !info.is_file {
                self.list_into(&info.path, recursive, files_only, out);
            }
        }
    }

    fn ensure_raw_zip_open(&self, access: &str) -> CoreResult<()> {
        let mut zips = self.raw_zips.lock().unwrap();
        if zips.contains_key(access) {
            return Ok(());
        }
        let path = self.raw_zip_path(access, "");
        let file = File::open(&path).map_err(|e| CoreError::io(&path, e))?;
        let archive = zip::ZipArchive::new(file)?;
        zips.insert(access.to_string(), archive);
        Ok(())
    }

    pub fn raw_file_bytes(&self, path: &str) -> CoreResult<Vec<u8>> {
        for access in ACCESS_BUCKETS {
            if self.ensure_raw_zip_open(access).is_err() {
                continue;
            }
            let mut zips = self.raw_zips.lock().unwrap();
            let archive = zips.get_mut(access).unwrap();
            let found = archive.by_name(path).ok().map(|mut entry| {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map(|_| buf)
            });
            drop(zips);

            if let Some(read_result) = found {
                if (access == "restricted" || always_restricted(path)) && !self.authorized() {
                    return Err(CoreError::Restricted(path.to_string()));
                }
                return read_result.map_err(|e| CoreError::io(path, e));
            }
        }
        Err(CoreError::NotFound(path.to_string()))
    }

    pub fn raw_file_size(&self, path: &str) -> CoreResult<u64> {
        for access in ACCESS_BUCKETS {
            if self.ensure_raw_zip_open(access).is_err() {
                continue;
            }
            let mut zips = self.raw_zips.lock().unwrap();
            let archive = zips.get_mut(access).unwrap();
            let size = archive.by_name(path).ok().map(|info| info.size());
            drop(zips);

            if let Some(size) = size {
                if (access == "restricted" || always_restricted(path)) && !self.authorized() {
                    return Err(CoreError::Restricted(path.to_string()));
                }
                return Ok(size);
            }
        }
        Err(CoreError::NotFound(path.to_string()))
    }

    pub fn raw_file_manifest(&self, path_prefix: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();
        for access in ACCESS_BUCKETS {
            if access == "restricted" && !self.authorized() {
                continue;
            }
            if self.ensure_raw_zip_open(access).is_err() {
                continue;
            }
            let mut zips = self.raw_zips.lock().unwrap();
            let archive = zips.get_mut(access).unwrap();
            for name in archive.file_names() {
                if always_restricted(name) && !self.authorized() {
                    continue;
                }
                if path_prefix.map(|p| name.starts_with(p)).unwrap_or(true) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    fn ensure_archive_open(&self, access: &str) -> CoreResult<()> {
        let mut archives = self.archives.lock().unwrap();
        if let Some(existing) = archives.get(access) {
            if !existing.is_closed() {
                return Ok(());
            }
        }
        let path = self.archive_msg_path(access, "");
        let reader = ArchiveReader::open(&path)?;
        archives.insert(access.to_string(), reader);
        Ok(())
    }

    /// Looks up `entry_id`'s archive record. If `access` is given, only that
    /// bucket is searched; otherwise public then restricted.
    pub fn read_archive_record(&self, entry_id: &str, access: Option<&str>) -> CoreResult<serde_json::Value> {
        let buckets: &[&str] = match access {
            Some(a) => match ACCESS_BUCKETS.iter().find(|b| **b == a) {
                Some(b) => std::slice::from_ref(b),
                None => return Err(CoreError::NotFound(entry_id.to_string())),
            },
            None => &ACCESS_BUCKETS,
        };

        for bucket in buckets {
            if self.ensure_archive_open(bucket).is_err() {
                continue;
            }
            let mut archives = self.archives.lock().unwrap();
            let reader = archives.get_mut(*bucket).unwrap();
            if reader.contains(entry_id) {
                if *bucket == "restricted" && !self.authorized() {
                    return Err(CoreError::Restricted(entry_id.to_string()));
                }
                return reader.get(entry_id)?.ok_or_else(|| CoreError::NotFound(entry_id.to_string()));
            }
        }
        Err(CoreError::NotFound(entry_id.to_string()))
    }

    /// Releases every cached zip and archive handle.
    pub fn close(&self) {
        let mut zips = self.raw_zips.lock().unwrap();
        zips.clear();
        let mut archives = self.archives.lock().unwrap();
        for reader in archives.values_mut() {
            reader.close();
        }
        archives.clear();
    }
}

/// Path to a raw zip bucket under `root`, honoring the `-repacked` etc. suffix
/// convention used by [`crate::lifecycle`].
pub fn raw_zip_path_in(root: &std::path::Path, access: &str, suffix: &str) -> PathBuf {
    root.join(format!("raw-{access}{suffix}.plain.zip"))
}

/// Path to an archive bucket under `root`, honoring `config.archive_version_suffix`.
pub fn archive_msg_path_in(root: &std::path::Path, config: &Config, access: &str, suffix: &str) -> PathBuf {
    match config.archive_version_suffix.as_deref() {
        Some(ver) if !ver.is_empty() => root.join(format!("archive-{access}{suffix}-{ver}.msg.msg")),
        _ => root.join(format!("archive-{access}{suffix}.msg.msg")),
    }
}

fn register_path(view: &mut DirectoryView, path: &str, size: u64, access: &'static str) {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return;
    }

    for i in 0..components.len() - 1 {
        let parent = components[..i].join("/");
        let name = components[i].to_string();
        let sub_path = components[..=i].join("/");
        view.entry(parent).or_default().entry(name).or_insert(UploadPathInfo {
            path: sub_path,
            is_file: false,
            size: -1,
            access,
        });
    }

    let parent = components[..components.len() - 1].join("/");
    let name = components[components.len() - 1].to_string();
    view.entry(parent).or_default().insert(
        name,
        UploadPathInfo {
            path: path.to_string(),
            is_file: true,
            size: size as i64,
            access,
        },
    );
}

fn split_path(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir.to_string(), base.to_string()),
        None => (String::new(), path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{allow_all, deny_all};
    use std::io::Write;

    fn setup(tmp: &std::path::Path, upload_id: &str) -> Config {
        let config = Config::under(tmp);
        config.ensure_roots_exist().unwrap();
        let dir = DirectoryObject::new(&config.public_root, upload_id, config.prefix_size, true).unwrap();

        let public_zip_path = dir.os_path().join("raw-public.plain.zip");
        let mut zip = zip::ZipWriter::new(File::create(&public_zip_path).unwrap());
        zip.start_file("a/main.out", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"main content").unwrap();
        zip.finish().unwrap();

        let restricted_zip_path = dir.os_path().join("raw-restricted.plain.zip");
        let mut zip = zip::ZipWriter::new(File::create(&restricted_zip_path).unwrap());
        zip.start_file("a/secret.out", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"secret content").unwrap();
        zip.finish().unwrap();

        config
    }

    #[test]
    fn public_file_readable_without_authorization() {
        let tmp = tempfile::tempdir().unwrap();
        let config = setup(tmp.path(), "upload-1");
        let store = PublicUploadFiles::new(&config, "upload-1", deny_all()).unwrap();

        assert!(store.raw_path_exists("a/main.out"));
        assert_eq!(store.raw_file_bytes("a/main.out").unwrap(), b"main content");
    }

    #[test]
    fn restricted_file_requires_authorization() {
        let tmp = tempfile::tempdir().unwrap();
        let config = setup(tmp.path(), "upload-1");
        let denied = PublicUploadFiles::new(&config, "upload-1", deny_all()).unwrap();
        assert!(matches!(denied.raw_file_bytes("a/secret.out"), Err(CoreError::Restricted(_))));

        let allowed = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        assert_eq!(allowed.raw_file_bytes("a/secret.out").unwrap(), b"secret content");
    }

    #[test]
    fn raw_file_manifest_omits_restricted_names_without_authorization() {
        let tmp = tempfile::tempdir().unwrap();
        let config = setup(tmp.path(), "upload-1");

        let denied = PublicUploadFiles::new(&config, "upload-1", deny_all()).unwrap();
        let names = denied.raw_file_manifest(None);
        assert!(names.contains(&"a/main.out".to_string()));
        assert!(!names.contains(&"a/secret.out".to_string()));

        let allowed = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        let names = allowed.raw_file_manifest(None);
        assert!(names.contains(&"a/main.out".to_string()));
        assert!(names.contains(&"a/secret.out".to_string()));
    }

    #[test]
    fn directory_listing_includes_both_buckets() {
        let tmp = tempfile::tempdir().unwrap();
        let config = setup(tmp.path(), "upload-1");
        let store = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();

        let listing = store.raw_directory_list("a", false, true);
        let names: Vec<_> = listing.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(names, vec!["a/main.out", "a/secret.out"]);
    }
}
