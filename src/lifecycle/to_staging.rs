//! Materializes a staging store seeded from a public upload (§4.8), for
//! in-place editing or as the intermediate step of `re_pack`.

use tracing::info;

use crate::access::AccessPredicate;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::public::PublicUploadFiles;
use crate::staging::StagingUploadFiles;

/// Creates a staging store backed by the raw zips (and, if `include_archive`,
/// the archive records) of `public`. Fails with [`CoreError::AlreadyExists`]
/// if a staging upload by this id already exists.
pub fn to_staging(public: &PublicUploadFiles, config: &Config, access: AccessPredicate, include_archive: bool) -> CoreResult<StagingUploadFiles> {
    if StagingUploadFiles::new(config, public.upload_id(), access.clone(), false).is_ok() {
        return Err(CoreError::AlreadyExists(public.upload_id().to_string()));
    }

    let staging = StagingUploadFiles::new(config, public.upload_id(), access, true)?;

    for bucket in ["public", "restricted"] {
        let zip_path = public.raw_zip_path(bucket, "");
        if zip_path.exists() {
            staging.add_raw_files(&zip_path, "", false)?;
        }

        if include_archive {
            let msg_path = public.archive_msg_path(bucket, "");
            if msg_path.exists() {
                let mut reader = crate::archive::ArchiveReader::open(&msg_path)?;
                let entry_ids: Vec<String> = reader.entry_ids().map(str::to_string).collect();
                for entry_id in entry_ids {
                    if let Some(value) = reader.get(&entry_id)? {
                        staging.write_archive_record(&entry_id, &value)?;
                    }
                }
            }
        }
    }

    info!(upload_id = public.upload_id(), include_archive, "materialized staging from public upload");
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::allow_all;
    use crate::directory_object::DirectoryObject;
    use crate::entry::EntryMetadata;
    use crate::lifecycle::pack::{pack, PackOptions};
    use std::path::Path;

    fn config_in(tmp: &Path) -> Config {
        let config = Config::under(tmp);
        config.ensure_roots_exist().unwrap();
        config
    }

    fn publish_sample(config: &Config) -> DirectoryObject {
        let staging = StagingUploadFiles::new(config, "upload-1", allow_all(), true).unwrap();
        std::fs::create_dir_all(staging.raw_dir().os_path().join("calc")).unwrap();
        std::fs::write(staging.raw_dir().os_path().join("calc/main.out"), b"data").unwrap();
        staging.write_archive_record("e1", &serde_json::json!({"x": 1})).unwrap();
        let entries = vec![EntryMetadata::new("e1", "calc/main.out", false)];
        let target_dir = pack(&staging, &entries, None, PackOptions::default()).unwrap();
        staging.delete(config, false).unwrap();
        target_dir
    }

    #[test]
    fn to_staging_seeds_raw_and_archive_content() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        publish_sample(&config);

        let public = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        let staging = to_staging(&public, &config, allow_all(), true).unwrap();

        assert!(staging.raw_path_exists("calc/main.out"));
        let record = staging.read_archive_record("e1").unwrap();
        assert_eq!(record, serde_json::json!({"x": 1}));
    }

    #[test]
    fn to_staging_twice_fails_with_already_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        publish_sample(&config);

        let public = PublicUploadFiles::new(&config, "upload-1", allow_all()).unwrap();
        to_staging(&public, &config, allow_all(), false).unwrap();

        let result = to_staging(&public, &config, allow_all(), false);
        assert!(matches!(result, Err(CoreError::AlreadyExists(_))));
    }
}
