//! Per-read authorization: the access predicate and the always-restricted
//! name rule.
//!
//! Both are first-class function values rather than monkey-patched callables
//! (see DESIGN.md), and they compose deterministically: a file is readable by
//! a caller iff it is in the public bucket and is not name-matched by
//! `always_restricted`, or the caller's [`AccessPredicate`] evaluates to true.

use std::sync::Arc;

/// A zero-argument boolean callback, invoked on every read that could expose
/// restricted bytes. Never cached across calls by the stores that hold it —
/// callers typically close over a per-request user identity and the upload's
/// embargo state.
pub type AccessPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// An access predicate that always denies.
pub fn deny_all() -> AccessPredicate {
    Arc::new(|| false)
}

/// An access predicate that always allows; useful for staging stores created
/// on behalf of their own owner, and for internal operations (pack, re-pack)
/// that must read regardless of embargo.
pub fn allow_all() -> AccessPredicate {
    Arc::new(|| true)
}

/// Puts a fixed restriction on file names regardless of embargo, e.g. for
/// proprietary pseudopotential files. Called during packing and while
/// accessing public files.
pub fn always_restricted(raw_path: &str) -> bool {
    let basename = raw_path.rsplit('/').next().unwrap_or(raw_path);
    basename.starts_with("POTCAR") && !basename.ends_with(".stripped")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn potcar_is_always_restricted() {
        assert!(always_restricted("pot/POTCAR"));
        assert!(always_restricted("POTCAR"));
    }

    #[test]
    fn stripped_potcar_is_not_restricted() {
        assert!(!always_restricted("pot/POTCAR.stripped"));
    }

    #[test]
    fn unrelated_files_are_not_restricted() {
        assert!(!always_restricted("a/main.x"));
    }
}
