//! Type-safe path handling for vaults on cloud storage.
//!
//! This module provides two distinct types to prevent confusion between:
//! - `DirectoryId`: opaque folder identities stored in `dir.c9r` markers
//! - `CloudPath`: hierarchical paths, used both for cleartext vault paths and
//!   for the ciphertext paths handed to a [`CloudProvider`](crate::provider::CloudProvider)

use relative_path::{Component, RelativePath, RelativePathBuf};
use std::fmt;
use thiserror::Error;

/// Errors produced by path arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The root path has no parent.
    #[error("The root path has no parent")]
    NoParent,
}

/// Opaque directory identifier.
///
/// Directory IDs are stored in `dir.c9r` markers and used as associated data
/// for filename encryption, binding every name to its parent folder. The
/// identity of a folder never changes, not even when it is renamed or moved.
///
/// # Examples
///
/// ```
/// use oxcloud_core::path::DirectoryId;
///
/// let root = DirectoryId::root();
/// assert!(root.is_root());
///
/// let id = DirectoryId::generate();
/// assert_eq!(id.as_bytes().len(), DirectoryId::GENERATED_LEN);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DirectoryId(Vec<u8>);

impl DirectoryId {
    /// Length of freshly generated identifiers (a hyphenated UUID string).
    pub const GENERATED_LEN: usize = 36;

    /// The root directory (empty byte string).
    #[inline]
    pub fn root() -> Self {
        DirectoryId(Vec::new())
    }

    /// Generate a new random directory ID.
    ///
    /// The ID is the UTF-8 encoding of a random UUIDv4, which is what every
    /// Cryptomator implementation writes into `dir.c9r`.
    pub fn generate() -> Self {
        DirectoryId(uuid::Uuid::new_v4().to_string().into_bytes())
    }

    /// Create a DirectoryId from raw marker bytes.
    #[inline]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        DirectoryId(bytes.into())
    }

    /// Check if this is the root directory.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for DirectoryId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            match std::str::from_utf8(&self.0) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "{}", hex::encode(&self.0)),
            }
        }
    }
}

impl fmt::Debug for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectoryId({self})")
    }
}

/// A normalized hierarchical path.
///
/// Paths use `/` as the separator regardless of the host OS. The canonical
/// string form has a single leading separator and no trailing separator;
/// the root is `/`. Whether a path denotes a file or a folder is up to the
/// caller, never encoded in the path itself.
///
/// Construction drops empty segments and `.` and resolves `..` lexically
/// (never above the root), so no segment is empty or contains a separator.
///
/// # Examples
///
/// ```
/// use oxcloud_core::path::CloudPath;
///
/// let path = CloudPath::new("/Documents//report.txt/");
/// assert_eq!(path.to_string(), "/Documents/report.txt");
/// assert_eq!(path.last_component(), Some("report.txt"));
/// assert_eq!(path.parent().unwrap().to_string(), "/Documents");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloudPath(RelativePathBuf);

impl CloudPath {
    /// The root path.
    #[inline]
    pub fn root() -> Self {
        CloudPath(RelativePathBuf::new())
    }

    /// Create a new path from a string, normalizing it.
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = RelativePath::new(path.as_ref().trim_start_matches('/')).normalize();
        let mut canonical = RelativePathBuf::new();
        for component in normalized.components() {
            if let Component::Normal(segment) = component {
                if !segment.is_empty() {
                    canonical.push(segment);
                }
            }
        }
        CloudPath(canonical)
    }

    /// Check if this is the root path.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    /// Path relative to the root, without the leading separator.
    #[inline]
    pub fn as_relative_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the underlying `RelativePath`.
    #[inline]
    pub fn as_relative_path(&self) -> &RelativePath {
        &self.0
    }

    /// Append one or more components.
    ///
    /// Separators inside `component` start new segments, so the result is
    /// always normalized.
    pub fn appending_component(&self, component: impl AsRef<str>) -> Self {
        CloudPath::new(self.0.join(component.as_ref()).as_str())
    }

    /// Get the parent path.
    pub fn parent(&self) -> Result<CloudPath, PathError> {
        if self.is_root() {
            return Err(PathError::NoParent);
        }
        Ok(self
            .0
            .parent()
            .map_or_else(CloudPath::root, |p| CloudPath(p.to_relative_path_buf())))
    }

    /// Get the final component of this path.
    ///
    /// Returns `None` for the root path.
    pub fn last_component(&self) -> Option<&str> {
        self.0.file_name()
    }

    /// Iterate over the components of this path.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Number of segments (zero for the root).
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Check whether `other` lies strictly below this path.
    ///
    /// The comparison is per segment, so `/foo` is an ancestor of `/foo/bar`
    /// but not of `/foobar`, and no path is its own ancestor.
    pub fn is_ancestor_of(&self, other: &CloudPath) -> bool {
        self != other && other.0.starts_with(&self.0)
    }

    /// Every ancestor from the top-level segment down to `self`, root excluded.
    ///
    /// ```
    /// use oxcloud_core::path::CloudPath;
    ///
    /// let chain: Vec<String> = CloudPath::new("/a/b/c")
    ///     .ancestors_from_root()
    ///     .iter()
    ///     .map(ToString::to_string)
    ///     .collect();
    /// assert_eq!(chain, vec!["/a", "/a/b", "/a/b/c"]);
    /// ```
    pub fn ancestors_from_root(&self) -> Vec<CloudPath> {
        let mut current = CloudPath::root();
        self.components()
            .map(|segment| {
                current = current.appending_component(segment);
                current.clone()
            })
            .collect()
    }

    /// Replace the `from` prefix of this path with `to`.
    ///
    /// Returns `None` if `from` is neither this path nor one of its ancestors.
    pub fn rebase(&self, from: &CloudPath, to: &CloudPath) -> Option<CloudPath> {
        let rest = self.0.strip_prefix(&from.0).ok()?;
        Some(CloudPath::new(to.0.join(rest).as_str()))
    }
}

impl Default for CloudPath {
    fn default() -> Self {
        CloudPath::root()
    }
}

impl AsRef<RelativePath> for CloudPath {
    fn as_ref(&self) -> &RelativePath {
        &self.0
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl fmt::Debug for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudPath({self})")
    }
}

impl From<&str> for CloudPath {
    fn from(s: &str) -> Self {
        CloudPath::new(s)
    }
}

impl From<String> for CloudPath {
    fn from(s: String) -> Self {
        CloudPath::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_directory_id_root() {
        let root = DirectoryId::root();
        assert!(root.is_root());
        assert!(root.as_bytes().is_empty());
        assert_eq!(root.to_string(), "<root>");
    }

    #[test]
    fn test_directory_id_generate_is_unique_and_fixed_length() {
        let a = DirectoryId::generate();
        let b = DirectoryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_bytes().len(), DirectoryId::GENERATED_LEN);
        assert!(!a.is_root());
    }

    #[test]
    fn test_cloud_path_root() {
        let root = CloudPath::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(CloudPath::new("/"), root);
        assert_eq!(CloudPath::new(""), root);
        assert_eq!(root.last_component(), None);
        assert_eq!(root.parent(), Err(PathError::NoParent));
    }

    #[test]
    fn test_cloud_path_normalization() {
        assert_eq!(CloudPath::new("/a/b/").to_string(), "/a/b");
        assert_eq!(CloudPath::new("a//b").to_string(), "/a/b");
        assert_eq!(CloudPath::new("/a/./b").to_string(), "/a/b");
        assert_eq!(CloudPath::new("/a/../b").to_string(), "/b");
        assert_eq!(CloudPath::new("/../../b").to_string(), "/b");
        assert_eq!(CloudPath::new("/a/b"), CloudPath::new("a/b/"));
    }

    #[test]
    fn test_cloud_path_appending_component() {
        let docs = CloudPath::new("/Documents");
        assert_eq!(docs.appending_component("a.txt").to_string(), "/Documents/a.txt");
        assert_eq!(CloudPath::root().appending_component("x").to_string(), "/x");
        assert_eq!(docs.appending_component("x/y").depth(), 3);
    }

    #[test]
    fn test_cloud_path_parent_chain() {
        let path = CloudPath::new("/Documents/Photos/vacation.jpg");
        let p1 = path.parent().unwrap();
        assert_eq!(p1.to_string(), "/Documents/Photos");
        let p2 = p1.parent().unwrap();
        assert_eq!(p2.to_string(), "/Documents");
        let p3 = p2.parent().unwrap();
        assert!(p3.is_root());
        assert!(p3.parent().is_err());
    }

    #[test]
    fn test_is_ancestor_of_is_segment_wise() {
        let foo = CloudPath::new("/foo");
        assert!(foo.is_ancestor_of(&CloudPath::new("/foo/bar")));
        assert!(foo.is_ancestor_of(&CloudPath::new("/foo/bar/baz")));
        assert!(!foo.is_ancestor_of(&CloudPath::new("/foobar")));
        assert!(!foo.is_ancestor_of(&CloudPath::new("/bar/foo")));
        assert!(!foo.is_ancestor_of(&foo));
        assert!(CloudPath::root().is_ancestor_of(&foo));
    }

    #[test]
    fn test_ancestors_from_root() {
        assert!(CloudPath::root().ancestors_from_root().is_empty());
        let chain = CloudPath::new("/Foo/Bar").ancestors_from_root();
        assert_eq!(chain, vec![CloudPath::new("/Foo"), CloudPath::new("/Foo/Bar")]);
    }

    #[test]
    fn test_rebase() {
        let from = CloudPath::new("/a");
        let to = CloudPath::new("/x/y");
        assert_eq!(
            CloudPath::new("/a/b/c").rebase(&from, &to),
            Some(CloudPath::new("/x/y/b/c"))
        );
        assert_eq!(CloudPath::new("/a").rebase(&from, &to), Some(to.clone()));
        assert_eq!(CloudPath::new("/ab").rebase(&from, &to), None);
    }

    proptest! {
        #[test]
        fn prop_segments_never_empty_or_contain_separator(raw in "[a-z/.]{0,40}") {
            let path = CloudPath::new(&raw);
            for segment in path.components() {
                prop_assert!(!segment.is_empty());
                prop_assert!(!segment.contains('/'));
            }
            prop_assert_eq!(CloudPath::new(path.to_string()), path);
        }
    }
}
