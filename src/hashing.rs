//! Deterministic entry identifiers and content hashes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256, Sha512};

use crate::config::IO_BUFFER_SIZE;

/// Deterministic id for the entry anchored at `mainfile` within `upload_id`.
/// A pure function of its inputs (§8, invariant 2).
pub fn calc_id(upload_id: &str, mainfile: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(upload_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(mainfile.as_bytes());
    websave_encode(&hasher.finalize())
}

/// SHA-512 over the concatenation of each file's bytes, read in the order
/// they are supplied (mainfile first, then sorted aux files), websave-encoded.
pub fn calc_hash_of_files<R: std::io::Read>(files: impl IntoIterator<Item = std::io::Result<R>>) -> std::io::Result<String> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; IO_BUFFER_SIZE];
    for file in files {
        let mut file = file?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(websave_encode(&hasher.finalize()))
}

/// URL-safe, unpadded base64 encoding used for hashes and ids throughout the
/// subsystem, so they are safe to embed directly in filesystem paths.
pub fn websave_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn calc_id_is_pure() {
        let a = calc_id("upload-1", "a/main.x");
        let b = calc_id("upload-1", "a/main.x");
        assert_eq!(a, b);
    }

    #[test]
    fn calc_id_distinguishes_mainfiles() {
        assert_ne!(calc_id("upload-1", "a/main.x"), calc_id("upload-1", "b/main.x"));
    }

    #[test]
    fn calc_id_distinguishes_uploads() {
        assert_ne!(calc_id("upload-1", "a/main.x"), calc_id("upload-2", "a/main.x"));
    }

    #[test]
    fn hash_is_order_sensitive_but_deterministic() {
        let files_a: Vec<std::io::Result<Cursor<&[u8]>>> = vec![Ok(Cursor::new(b"main")), Ok(Cursor::new(b"aux"))];
        let files_b: Vec<std::io::Result<Cursor<&[u8]>>> = vec![Ok(Cursor::new(b"main")), Ok(Cursor::new(b"aux"))];
        let a = calc_hash_of_files(files_a).unwrap();
        let b = calc_hash_of_files(files_b).unwrap();
        assert_eq!(a, b);
    }
}
