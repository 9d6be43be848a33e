//! Relative paths inside the synchronized root
//!
//! A [`RelPath`] is the join key shared by the local walk, the remote walk and
//! the persisted state. It is always slash-separated and normalized to Unicode
//! NFC so that names produced by different filesystems compare equal.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::errors::DomainError;

/// Name of the hidden directory holding in-progress downloads.
pub const TEMP_DIR_NAME: &str = ".putsync-tmp";

/// OS metadata files that are never synchronized (compared case-insensitively).
const IGNORED_NAMES: &[&str] = &["desktop.ini", "thumbs.db", ".ds_store", "icon\r"];

/// Slash-separated, NFC-normalized path relative to the sync root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Creates a relative path, normalizing it to NFC
    ///
    /// Leading `./`, duplicate and trailing slashes are removed.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] for empty or absolute paths, paths
    /// containing NUL bytes, and paths with `.` or `..` components.
    pub fn new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = path.as_ref();
        if raw.starts_with('/') {
            return Err(DomainError::InvalidPath(format!("absolute path: {raw}")));
        }
        if raw.contains('\0') {
            return Err(DomainError::InvalidPath(format!("NUL byte in path: {raw:?}")));
        }

        let normalized: String = raw.nfc().collect();
        let mut parts = Vec::new();
        for part in normalized.split('/') {
            match part {
                "" => continue,
                "." if parts.is_empty() => continue,
                "." | ".." => {
                    return Err(DomainError::InvalidPath(format!(
                        "relative component in path: {raw}"
                    )))
                }
                other => parts.push(other),
            }
        }
        if parts.is_empty() {
            return Err(DomainError::InvalidPath("empty path".to_string()));
        }
        Ok(Self(parts.join("/")))
    }

    /// Builds a relative path from an absolute local path under `root`
    ///
    /// Returns `None` when `path` is `root` itself or lies outside it.
    pub fn from_local(root: &Path, path: &Path) -> Option<Self> {
        let rel = path.strip_prefix(root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Self::new(parts.join("/")).ok()
    }

    /// Returns the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final component
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the containing directory, or `None` for top-level entries
    pub fn parent(&self) -> Option<RelPath> {
        self.0
            .rsplit_once('/')
            .map(|(dir, _)| RelPath(dir.to_string()))
    }

    /// Splits into the parent directory (empty string at top level) and the name
    pub fn split(&self) -> (&str, &str) {
        match self.0.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", &self.0),
        }
    }

    /// Appends a single child name
    ///
    /// # Errors
    /// Fails if `name` contains a slash or otherwise forms an invalid path.
    pub fn join(&self, name: &str) -> Result<RelPath, DomainError> {
        if name.contains('/') {
            return Err(DomainError::InvalidPath(format!("slash in name: {name}")));
        }
        RelPath::new(format!("{}/{}", self.0, name))
    }

    /// Returns true if `self` lies strictly below `ancestor`
    pub fn is_child_of(&self, ancestor: &RelPath) -> bool {
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// Returns true if the first component is the temp-transfer directory
    pub fn is_in_temp_dir(&self) -> bool {
        self.0.split('/').next() == Some(TEMP_DIR_NAME)
    }
}

/// Ordering used by reconciliation: children sort before their ancestors,
/// everything else is lexicographic by component.
///
/// Comparing component-wise keeps this a total order. A plain string
/// comparison would not be one, since `-` sorts before `/`.
pub fn children_first(a: &RelPath, b: &RelPath) -> Ordering {
    let mut left = a.0.split('/');
    let mut right = b.0.split('/');
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) if x == y => continue,
            (Some(x), Some(y)) => return x.cmp(y),
            // The longer path is a descendant and goes first.
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Returns true if two single names are equal once normalized to NFC
pub fn same_name(a: &str, b: &str) -> bool {
    a.nfc().eq(b.nfc())
}

/// Returns true for OS metadata file names that are never synchronized
pub fn is_ignored_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    IGNORED_NAMES.contains(&lower.as_str())
}

impl Display for RelPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RelPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelPath::new(value)
    }
}

impl From<RelPath> for String {
    fn from(value: RelPath) -> Self {
        value.0
    }
}
