//! Mutable republication (§4.7): rebuilds a public upload's zip/archive
//! files from a freshly materialized staging copy, e.g. after an embargo
//! flag changes.

use tracing::info;

use crate::access::AccessPredicate;
use crate::config::Config;
use crate::entry::EntryMetadata;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::pack::{pack_archive_files, pack_raw_files};
use crate::lifecycle::to_staging::to_staging;
use crate::public::{archive_msg_path_in, raw_zip_path_in, PublicUploadFiles};

const REPACKED_SUFFIX: &str = "-repacked";

/// Rebuilds `public`'s zip/archive files against `entries`' current embargo
/// state. Fails with [`CoreError::AlreadyExists`] if a repack is already in
/// progress (leftover `-repacked` files).
pub fn re_pack(public: &PublicUploadFiles, config: &Config, access: AccessPredicate, entries: &[EntryMetadata], skip_raw: bool, skip_archive: bool) -> CoreResult<()> {
    let root = public.root().os_path();
    let mut files: Vec<(std::path::PathBuf, std::path::PathBuf)> = Vec::new();
    for bucket in ["public", "restricted"] {
        if !skip_archive {
            files.push((archive_msg_path_in(root, config, bucket, REPACKED_SUFFIX), archive_msg_path_in(root, config, bucket, "")));
        }
        if !skip_raw {
            files.push((raw_zip_path_in(root, bucket, REPACKED_SUFFIX), raw_zip_path_in(root, bucket, "")));
        }
    }

    for (repacked, _) in &files {
        if repacked.exists() {
            return Err(CoreError::AlreadyExists(public.upload_id().to_string()));
        }
    }

    let staging = to_staging(public, config, access, true)?;

    let result = (|| -> CoreResult<()> {
        if !skip_archive {
            pack_archive_files(&staging, entries, root, REPACKED_SUFFIX)?;
        }
        if !skip_raw {
            pack_raw_files(&staging, entries, root, REPACKED_SUFFIX)?;
        }
        Ok(())
    })();

    staging.delete(config, false)?;
    result?;

    for (repacked, live) in &files {
        std::fs::rename(repacked, live).map_err(|e| CoreError::io(live, e))?;
    }

    info!(upload_id = public.upload_id(), "re-packed upload");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::allow_all;
    use crate::lifecycle::pack::{pack, PackOptions};
    use crate::staging::StagingUploadFiles;
    use std::path::Path;

    fn config_in(tmp: &Path) -> Config {
        let config = Config::under(tmp);
        config.ensure_roots_exist().unwrap();
        config
    }

    fn publish_sample(config: &Config) {
        let staging = StagingUploadFiles::new(config, "upload-1", allow_all(), true).unwrap();
        std::fs::create_dir_all(staging.raw_dir().os_path().join("calc")).unwrap();
        std::fs::write(staging.raw_dir().os_path().join("calc/main.out"), b"data").unwrap();
        staging.write_archive_record("e1", &serde_json::json!({"x": 1})).unwrap();
        let entries = vec![EntryMetadata::new("e1", "calc/main.out", false)];
        pack(&staging, &entries, None, PackOptions::default()).unwrap();
        staging.delete(config, false).unwrap();
    }

    #[test]
    fn re_pack_lifts_embargo_into_public_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        publish_sample(&config);

        let public = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        let new_entries = vec![EntryMetadata::new("e1", "calc/main.out", true)];
        re_pack(&public, &config, allow_all(), &new_entries, false, false).unwrap();

        let zip_path = raw_zip_path_in(public.root().os_path(), "restricted", "");
        let file = std::fs::File::open(&zip_path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert!(archive.file_names().any(|n| n == "calc/main.out"));
    }

    #[test]
    fn re_pack_rejects_concurrent_repack() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        publish_sample(&config);

        let public = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        std::fs::write(raw_zip_path_in(public.root().os_path(), "public", REPACKED_SUFFIX), b"stale").unwrap();

        let entries = vec![EntryMetadata::new("e1", "calc/main.out", false)];
        let result = re_pack(&public, &config, allow_all(), &entries, false, false);
        assert!(matches!(result, Err(CoreError::AlreadyExists(_))));
    }
}
