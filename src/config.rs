//! Explicit configuration for the Upload-Files storage subsystem.
//!
//! The reference implementation reads these values off a process-wide `config.fs.*`
//! module. We replace that ambient global with an explicit value constructed once
//! by the embedding host and threaded into every store constructor.

use std::env;
use std::path::PathBuf;

/// Default number of aux files considered before the cutoff kicks in.
pub const DEFAULT_AUXFILE_CUTOFF: usize = 100;

/// Default length of the hashed-prefix shard directory name (0 disables sharding).
pub const DEFAULT_PREFIX_SIZE: usize = 2;

/// Buffer size used when streaming file contents for hashing or zip writes.
pub const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Filesystem roots and tunables for one deployment of the storage subsystem.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory under which staging uploads live.
    pub staging_root: PathBuf,
    /// Root directory under which public uploads live.
    pub public_root: PathBuf,
    /// Root directory for scratch extraction of incoming archives.
    pub tmp_root: PathBuf,
    /// Length of the hashed-prefix shard directory name; 0 disables sharding.
    pub prefix_size: usize,
    /// Maximum number of aux files gathered per mainfile when `with_cutoff` is set.
    pub auxfile_cutoff: usize,
    /// Optional archive-format version suffix, for migrations (e.g. `"v2"`).
    pub archive_version_suffix: Option<String>,
}

impl Config {
    /// Build a config rooted at `base`, with `staging/`, `public/` and `tmp/`
    /// subdirectories and the reference implementation's defaults.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Config {
            staging_root: base.join("staging"),
            public_root: base.join("public"),
            tmp_root: base.join("tmp"),
            prefix_size: DEFAULT_PREFIX_SIZE,
            auxfile_cutoff: DEFAULT_AUXFILE_CUTOFF,
            archive_version_suffix: None,
        }
    }

    /// Build a config from the conventional `NOMAD_FS_STAGING` / `NOMAD_FS_PUBLIC` /
    /// `NOMAD_FS_TMP` environment variables, falling back to `Config::under(".")`
    /// for any that are unset.
    pub fn from_env() -> Self {
        let mut config = Config::under(".");
        if let Ok(v) = env::var("NOMAD_FS_STAGING") {
            config.staging_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("NOMAD_FS_PUBLIC") {
            config.public_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("NOMAD_FS_TMP") {
            config.tmp_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("NOMAD_FS_PREFIX_SIZE") {
            if let Ok(n) = v.parse() {
                config.prefix_size = n;
            }
        }
        if let Ok(v) = env::var("NOMAD_FS_AUXFILE_CUTOFF") {
            if let Ok(n) = v.parse() {
                config.auxfile_cutoff = n;
            }
        }
        if let Ok(v) = env::var("NOMAD_FS_ARCHIVE_VERSION_SUFFIX") {
            config.archive_version_suffix = Some(v);
        }
        config
    }

    pub fn ensure_roots_exist(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.staging_root)?;
        std::fs::create_dir_all(&self.public_root)?;
        std::fs::create_dir_all(&self.tmp_root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_lays_out_three_roots() {
        let config = Config::under("/data/fs");
        assert_eq!(config.staging_root, PathBuf::from("/data/fs/staging"));
        assert_eq!(config.public_root, PathBuf::from("/data/fs/public"));
        assert_eq!(config.tmp_root, PathBuf::from("/data/fs/tmp"));
        assert_eq!(config.prefix_size, DEFAULT_PREFIX_SIZE);
    }
}
