//! Group path helpers.
//!
//! Paths are '/'-delimited. Empty segments are ignored, so `"a//b/"` and
//! `"a/b"` name the same group.

use super::error::{Error, Result};

/// Characters allowed in file names and paths besides ASCII alphanumerics.
const LEGAL_PUNCT: &[u8] = b"_-+./$:";

/// Reject strings that contain anything but alphanumerics and `_-+./$:`.
pub fn check_legal(s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::InvalidPath("empty path".into()));
    }
    match s.bytes().find(|b| !b.is_ascii_alphanumeric() && !LEGAL_PUNCT.contains(b)) {
        Some(bad) => Err(Error::InvalidPath(format!("{:?} contains illegal character {:?}", s, bad as char))),
        None => Ok(()),
    }
}

/// Non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Join two path fragments with a single separator.
pub fn join(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, rel),
    }
}

/// Split `group/sub/field` into (`group/sub`, `field`).
///
/// A path without '/' has no group part.
pub fn split_field(path: &str) -> (Option<&str>, &str) {
    match path.rfind('/') {
        Some(i) => (Some(&path[..i]), &path[i + 1..]),
        None => (None, path),
    }
}

/// Replace the leading segment of `path` by `index`.
///
/// `"aos/sub"` becomes `"3/sub"`. Paths without '/' are rejected.
pub fn substitute_leading(path: &str, index: usize) -> Result<String> {
    match path.find('/') {
        Some(i) => Ok(format!("{}/{}", index, &path[i + 1..])),
        None => Err(Error::InvalidPath(format!("malformed object path {:?}", path))),
    }
}

/// Group part of an object field path with its leading segment replaced
/// by `index`. A bare `aos` or a missing group part both map to `"<index>"`.
pub fn indexed_group(group: Option<&str>, index: usize) -> String {
    match group.and_then(|g| g.find('/').map(|i| &g[i + 1..])) {
        Some(rest) => format!("{}/{}", index, rest),
        None => index.to_string(),
    }
}
