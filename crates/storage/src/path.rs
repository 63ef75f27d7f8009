//! Blob path derivation and path hygiene.
//!
//! A record's blob lives at `YYYY/MM/DD/HH/<bucket>/<uid>`, derived purely
//! from the record's creation time, its captured minute resolution and its
//! uid. Records carry the resolution that was in force when they were
//! created, so the mapping stays stable even if the configured resolution
//! changes later.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;

/// Suffix under which staged writes are hidden until `make_permanent`.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Derive the storage path for a blob from its record identity.
///
/// The minute component is rounded down to the record's own bucket
/// resolution, in UTC. Changing any input changes the output, which is why
/// `ctime`, `uid` and the captured resolution are never mutated after
/// creation.
///
/// # Examples
///
/// ```
/// use hoard_storage::resolve_path;
///
/// // 2012-03-04 05:06:07 UTC, 5-minute buckets
/// let path = resolve_path(1330837567.25, 5, "deadbeef").unwrap();
/// assert_eq!(path.to_str().unwrap(), "2012/03/04/05/05/deadbeef");
/// ```
pub fn resolve_path(ctime: f64, min_res: u32, uid: &str) -> Result<PathBuf> {
    let timestamp = OffsetDateTime::from_unix_timestamp(ctime as i64)
        .map_err(|_| exn::Exn::from(ErrorKind::InvalidPath(PathBuf::from(uid))))?;
    let resolution = min_res.max(1);
    let bucket = u32::from(timestamp.minute()) / resolution * resolution;
    Ok(PathBuf::from(format!(
        "{:04}/{:02}/{:02}/{:02}/{:02}/{}",
        timestamp.year(),
        u8::from(timestamp.month()),
        timestamp.day(),
        timestamp.hour(),
        bucket,
        uid,
    )))
}

/// The hidden sibling a staged write lands at before `make_permanent`.
#[must_use]
pub fn staged_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

/// Whether a blob's bucket is old enough that directory pruning cannot race
/// with concurrent writes into the same bucket: the record must be more than
/// `2 × minRes` minutes old.
#[must_use]
pub fn prune_eligible(now: f64, ctime: f64, min_res: u32) -> bool {
    now - ctime > f64::from(min_res) * 120.0
}

/// Validates a storage path for use relative to a backend root.
/// Ensures that paths don't escape the root (no `..` traversal).
///
/// # Returns
/// Returns the normalized path if valid, or
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) if invalid.
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    // Use Rust's built-in path component parser for robust handling.
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls — reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_resolve_path_buckets() {
        // 2012-03-04 05:06:07 UTC
        let ts = 1330837567.0;
        assert_eq!(resolve_path(ts, 5, "u").unwrap(), Path::new("2012/03/04/05/05/u"));
        assert_eq!(resolve_path(ts, 10, "u").unwrap(), Path::new("2012/03/04/05/00/u"));
        assert_eq!(resolve_path(ts, 1, "u").unwrap(), Path::new("2012/03/04/05/06/u"));
        // Hour-wide buckets all collapse to 00
        assert_eq!(resolve_path(ts, 60, "u").unwrap(), Path::new("2012/03/04/05/00/u"));
    }

    #[test]
    fn test_resolve_path_deterministic() {
        let a = resolve_path(1330837567.75, 5, "abc").unwrap();
        let b = resolve_path(1330837567.75, 5, "abc").unwrap();
        assert_eq!(a, b);
        // The fractional part never shifts the bucket
        let c = resolve_path(1330837567.0, 5, "abc").unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_resolve_path_zero_resolution_treated_as_one() {
        assert_eq!(resolve_path(1330837567.0, 0, "u").unwrap(), Path::new("2012/03/04/05/06/u"));
    }

    #[test]
    fn test_staged_path() {
        assert_eq!(staged_path(Path::new("2012/03/04/05/05/u")), Path::new("2012/03/04/05/05/u.tmp"));
    }

    #[rstest]
    #[case(0.0, 0.0, 5, false)]
    #[case(599.0, 0.0, 5, false)] // exactly 2 x 5min - 1s: too young
    #[case(600.0, 0.0, 5, false)] // boundary is exclusive
    #[case(601.0, 0.0, 5, true)]
    #[case(10_000.0, 0.0, 5, true)]
    fn test_prune_eligible(#[case] now: f64, #[case] ctime: f64, #[case] res: u32, #[case] expected: bool) {
        assert_eq!(prune_eligible(now, ctime, res), expected);
    }

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("2012/03/04/05/05/u")).unwrap(), Path::new("2012/03/04/05/05/u"));
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b")).unwrap(), Path::new("a/b"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_invalid_characters_and_empties() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
    }
}
