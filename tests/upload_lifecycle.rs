//! End-to-end lifecycle tests against the public crate API: pack, re-pack,
//! and the access-control invariants that must hold across both stores.

use nomad_upload_files::access::allow_all;
use nomad_upload_files::entry::EntryMetadata;
use nomad_upload_files::error::CoreError;
use nomad_upload_files::lifecycle::{pack_upload, re_pack, PackOptions};
use nomad_upload_files::upload_files::UploadFiles;
use nomad_upload_files::{Config, PublicUploadFiles, StagingUploadFiles};
use tempfile::TempDir;

fn config() -> (TempDir, Config) {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config::under(tmp.path());
    cfg.ensure_roots_exist().unwrap();
    (tmp, cfg)
}

fn write_raw(staging: &StagingUploadFiles, path: &str, data: &[u8]) {
    let target = staging.raw_file_object(path);
    std::fs::create_dir_all(target.os_path().parent().unwrap()).unwrap();
    std::fs::write(target.os_path(), data).unwrap();
}

#[test]
fn pack_partitions_two_entries_one_embargoed() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s1", allow_all(), true).unwrap();
    write_raw(&staging, "a/main.x", b"main a");
    write_raw(&staging, "a/aux.y", b"aux a");
    write_raw(&staging, "b/main.x", b"main b");
    staging.write_archive_record("A", &serde_json::json!({"entry": "A"})).unwrap();
    staging.write_archive_record("B", &serde_json::json!({"entry": "B"})).unwrap();

    let entries = vec![EntryMetadata::new("A", "a/main.x", false), EntryMetadata::new("B", "b/main.x", true)];
    let public_dir = pack_upload(&staging, &entries, None, PackOptions::default()).unwrap();

    let public = PublicUploadFiles::new(&cfg, "upload-s1", allow_all()).unwrap();
    assert_eq!(public.root().os_path(), public_dir.os_path());

    assert!(public.raw_path_exists("a/main.x"));
    assert!(public.raw_path_exists("a/aux.y"));
    assert_eq!(public.read_archive_record("A", None).unwrap(), serde_json::json!({"entry": "A"}));

    let no_access = PublicUploadFiles::new(&cfg, "upload-s1", nomad_upload_files::access::deny_all()).unwrap();
    assert!(!no_access.raw_path_exists("b/main.x"));
    let err = no_access.raw_file_bytes("b/main.x").unwrap_err();
    assert!(matches!(err, CoreError::Restricted(_) | CoreError::NotFound(_)));
}

#[test]
fn aux_overlap_prefers_the_public_owning_entry() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s2", allow_all(), true).unwrap();
    write_raw(&staging, "b/main.x", b"main b");
    write_raw(&staging, "b/aux.y", b"aux b");

    let entries = vec![EntryMetadata::new("B", "b/main.x", true), EntryMetadata::new("C", "b/aux.y", false)];
    let public_dir = pack_upload(&staging, &entries, None, PackOptions::default()).unwrap();

    let public = PublicUploadFiles::new(&cfg, "upload-s2", allow_all()).unwrap();
    assert_eq!(public.root().os_path(), public_dir.os_path());
    assert!(public.raw_path_exists("b/aux.y"));

    let no_access = PublicUploadFiles::new(&cfg, "upload-s2", nomad_upload_files::access::deny_all()).unwrap();
    assert!(!no_access.raw_path_exists("b/main.x"));
}

#[test]
fn potcar_stays_restricted_under_a_public_entry() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s3", allow_all(), true).unwrap();
    write_raw(&staging, "pot/main.x", b"main");
    write_raw(&staging, "pot/POTCAR", b"proprietary potential");

    let entries = vec![EntryMetadata::new("P", "pot/main.x", false)];
    pack_upload(&staging, &entries, None, PackOptions::default()).unwrap();

    let no_access = PublicUploadFiles::new(&cfg, "upload-s3", nomad_upload_files::access::deny_all()).unwrap();
    assert!(!no_access.raw_path_exists("pot/POTCAR"));

    let authorized = PublicUploadFiles::new(&cfg, "upload-s3", allow_all()).unwrap();
    assert!(authorized.raw_path_exists("pot/POTCAR"));
}

#[test]
fn re_pack_lifts_embargo_end_to_end() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s4", allow_all(), true).unwrap();
    write_raw(&staging, "a/main.x", b"main a");
    write_raw(&staging, "b/main.x", b"main b");
    staging.write_archive_record("A", &serde_json::json!({})).unwrap();
    staging.write_archive_record("B", &serde_json::json!({})).unwrap();
    let entries = vec![EntryMetadata::new("A", "a/main.x", false), EntryMetadata::new("B", "b/main.x", true)];
    pack_upload(&staging, &entries, None, PackOptions::default()).unwrap();
    staging.delete(&cfg, false).unwrap();

    let public = PublicUploadFiles::new(&cfg, "upload-s4", allow_all()).unwrap();
    let lifted = vec![EntryMetadata::new("A", "a/main.x", false), EntryMetadata::new("B", "b/main.x", false)];
    re_pack(&public, &cfg, allow_all(), &lifted, false, false).unwrap();

    let refreshed = PublicUploadFiles::new(&cfg, "upload-s4", nomad_upload_files::access::deny_all()).unwrap();
    assert!(refreshed.raw_path_exists("a/main.x"));
    assert!(refreshed.raw_path_exists("b/main.x"));
}

#[test]
fn malformed_raw_path_is_not_found_everywhere() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s5", allow_all(), true).unwrap();
    write_raw(&staging, "calc/main.x", b"data");

    assert!(!staging.raw_path_exists("../etc/passwd"));
    let err = UploadFiles::raw_file_bytes(&staging, "../etc/passwd").unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn frozen_staging_rejects_further_writes_but_keeps_existing_raw_tree() {
    let (_tmp, cfg) = config();
    let staging = StagingUploadFiles::new(&cfg, "upload-s6", allow_all(), true).unwrap();
    write_raw(&staging, "calc/main.x", b"data");
    let entries = vec![EntryMetadata::new("A", "calc/main.x", false)];
    pack_upload(&staging, &entries, None, PackOptions::default()).unwrap();

    assert!(staging.raw_path_exists("calc/main.x"));
    let tmp2 = tempfile::tempdir().unwrap();
    std::fs::write(tmp2.path().join("extra.x"), b"more").unwrap();
    let result = staging.add_raw_files(&tmp2.path().join("extra.x"), "", false);
    assert!(matches!(result, Err(CoreError::Frozen(_))));
}
