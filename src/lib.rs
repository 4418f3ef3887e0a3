//! Upload-Files storage subsystem: staged and public upload lifecycle for
//! research-data archives.
//!
//! An upload exists in exactly one of three states — absent, staging, or
//! public — tracked entirely by filesystem layout (see [`config::Config`]).
//! [`staging::StagingUploadFiles`] is the mutable working tree; [`public::PublicUploadFiles`]
//! is the immutable, zip/archive-backed published form; the [`lifecycle`]
//! module moves an upload between the two.

pub mod access;
pub mod archive;
pub mod config;
pub mod directory_object;
pub mod entry;
pub mod error;
pub mod hashing;
pub mod lifecycle;
pub mod path_object;
pub mod public;
pub mod raw_path;
pub mod staging;
pub mod upload_files;
pub mod upload_path_info;
pub mod user_metadata;

pub use access::AccessPredicate;
pub use config::Config;
pub use entry::EntryMetadata;
pub use error::{CoreError, CoreResult};
pub use public::PublicUploadFiles;
pub use staging::StagingUploadFiles;
pub use upload_files::UploadFiles;
pub use upload_path_info::UploadPathInfo;
