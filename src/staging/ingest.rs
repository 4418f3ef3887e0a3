//! Ingestion of raw files into a staging upload's raw tree: single files,
//! directories, and zip/tar(.gz) archives, merged into an existing tree.

use std::fs::File;
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::directory_object::DirectoryObject;
use crate::error::{CoreError, CoreResult};

/// Merges the contents of `source` into `raw_dir` at `target_dir` (a raw
/// path). `source` may be a single file, a directory, or a zip/tar(.gz)
/// archive — archives are extracted into a scratch directory under the
/// configured temp root first. Existing target files are overwritten;
/// existing target directories are merged into. Symlinks in the source are
/// skipped. `move_source` selects move vs copy semantics for plain files.
pub fn add_raw_files(config: &Config, raw_dir: &DirectoryObject, source: &Path, target_dir: &str, move_source: bool) -> CoreResult<()> {
    if !source.exists() {
        return Err(CoreError::NotFound(source.display().to_string()));
    }

    let mut scratch = None;
    let merge_root = if source.is_dir() {
        source.to_path_buf()
    } else if is_zip(source)? {
        let dir = extract_zip(config, source)?;
        let path = dir.path().to_path_buf();
        scratch = Some(dir);
        path
    } else if is_tar(source)? {
        let dir = extract_tar(config, source)?;
        let path = dir.path().to_path_buf();
        scratch = Some(dir);
        path
    } else {
        source.parent().map(Path::to_path_buf).unwrap_or_else(|| Path::new(".").to_path_buf())
    };

    let single_file = scratch.is_none() && !source.is_dir();

    let target_root = ensure_target_dir(raw_dir, target_dir)?;

    if single_file {
        let file_name = source.file_name().expect("file source has a name");
        merge_one(source, &target_root.join(file_name), move_source)?;
    } else {
        merge_tree(&merge_root, &target_root, scratch.is_some() || move_source)?;
    }

    // `scratch`, if set, is a `tempfile::TempDir` holding the extracted
    // archive contents; it is removed on drop here.
    drop(scratch);

    // `move_source` always removes the source artifact itself, whether it
    // was a plain file already consumed by `rename` above, a directory
    // merged file-by-file into the target, or a zip/tar archive whose
    // contents were merged from the (now-dropped) scratch directory.
    if move_source && source.exists() {
        if source.is_dir() {
            std::fs::remove_dir_all(source).map_err(|e| CoreError::io(source, e))?;
        } else {
            std::fs::remove_file(source).map_err(|e| CoreError::io(source, e))?;
        }
    }

    info!(target_dir, source = %source.display(), "added raw files");
    Ok(())
}

fn ensure_target_dir(raw_dir: &DirectoryObject, target_dir: &str) -> CoreResult<std::path::PathBuf> {
    let mut path = raw_dir.os_path().to_path_buf();
    if !target_dir.is_empty() {
        for component in target_dir.split('/') {
            path = path.join(component);
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| CoreError::io(&path, e))?;
            }
            if !path.is_dir() {
                std::fs::create_dir_all(&path).map_err(|e| CoreError::io(&path, e))?;
            }
        }
    } else if !path.is_dir() {
        std::fs::create_dir_all(&path).map_err(|e| CoreError::io(&path, e))?;
    }
    Ok(path)
}

fn is_zip(path: &Path) -> CoreResult<bool> {
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    Ok(zip::ZipArchive::new(file).is_ok())
}

fn is_gzip(path: &Path) -> CoreResult<bool> {
    let bytes = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
    Ok(bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b)
}

/// Tries to parse `path` as a tar stream (gzip-wrapped or plain) without
/// extracting; used purely for format detection.
fn is_tar(path: &Path) -> CoreResult<bool> {
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let probably_gzip = is_gzip(path)?;
    let parses = if probably_gzip {
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        archive.entries().map(|mut entries| entries.all(|e| e.is_ok())).unwrap_or(false)
    } else {
        let mut archive = tar::Archive::new(file);
        archive.entries().map(|mut entries| entries.all(|e| e.is_ok())).unwrap_or(false)
    };
    Ok(parses)
}

fn extract_zip(config: &Config, path: &Path) -> CoreResult<tempfile::TempDir> {
    std::fs::create_dir_all(&config.tmp_root).map_err(|e| CoreError::io(&config.tmp_root, e))?;
    let dir = tempfile::tempdir_in(&config.tmp_root).map_err(|e| CoreError::io(&config.tmp_root, e))?;

    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dir.path())?;
    debug!(archive = %path.display(), dest = %dir.path().display(), "extracted zip archive");
    Ok(dir)
}

fn extract_tar(config: &Config, path: &Path) -> CoreResult<tempfile::TempDir> {
    std::fs::create_dir_all(&config.tmp_root).map_err(|e| CoreError::io(&config.tmp_root, e))?;
    let dir = tempfile::tempdir_in(&config.tmp_root).map_err(|e| CoreError::io(&config.tmp_root, e))?;

    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    if is_gzip(path)? {
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        archive.unpack(dir.path()).map_err(|e| CoreError::io(path, e))?;
    } else {
        let mut archive = tar::Archive::new(file);
        archive.unpack(dir.path()).map_err(|e| CoreError::io(path, e))?;
    }
    debug!(archive = %path.display(), dest = %dir.path().display(), "extracted tar archive");
    Ok(dir)
}

fn merge_one(source: &Path, target: &std::path::Path, move_source: bool) -> CoreResult<()> {
    if target.is_dir() {
        std::fs::remove_dir_all(target).map_err(|e| CoreError::io(target, e))?;
    } else if target.exists() {
        std::fs::remove_file(target).map_err(|e| CoreError::io(target, e))?;
    }
    if move_source {
        std::fs::rename(source, target).map_err(|e| CoreError::io(target, e))?;
    } else {
        std::fs::copy(source, target).map_err(|e| CoreError::io(target, e))?;
    }
    Ok(())
}

/// Walks `source_root`, merging every file/dir into `target_root`. When
/// `move_files` is set, files are moved rather than copied (always true for
/// an extracted archive's scratch directory, since it is discarded anyway).
fn merge_tree(source_root: &Path, target_root: &Path, move_files: bool) -> CoreResult<()> {
    for entry in walkdir::WalkDir::new(source_root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        let source_path = entry.path();
        if entry.path_is_symlink() {
            continue;
        }
        let relative = source_path.strip_prefix(source_root).unwrap();
        let target_path = target_root.join(relative);

        if entry.file_type().is_dir() {
            if target_path.is_file() {
                std::fs::remove_file(&target_path).map_err(|e| CoreError::io(&target_path, e))?;
            }
            if !target_path.exists() {
                std::fs::create_dir_all(&target_path).map_err(|e| CoreError::io(&target_path, e))?;
            }
        } else {
            if target_path.is_dir() {
                std::fs::remove_dir_all(&target_path).map_err(|e| CoreError::io(&target_path, e))?;
            }
            if let Some(parent) = target_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
            }
            if move_files {
                std::fs::rename(source_path, &target_path).map_err(|e| CoreError::io(&target_path, e))?;
            } else {
                std::fs::copy(source_path, &target_path).map_err(|e| CoreError::io(&target_path, e))?;
            }
        }
    }
    Ok(())
}
