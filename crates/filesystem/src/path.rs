//! Hierarchical paths over a flat bucket/key namespace.
//!
//! An absolute path is `/bucket/segment/segment...`: the first segment names
//! the bucket and the remaining segments, joined with `/`, form the object
//! key. Relative paths are plain segment lists that only become addressable
//! once resolved against an absolute path.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::attributes::CachedAttributes;
use crate::error::FileSystemError;

/// Segment separator, in path text and in store keys.
pub const SEPARATOR: char = '/';

/// A parsed path.
///
/// Equality, ordering and hashing look only at the absolute flag and the
/// segment list. A trailing `/` in the source text is remembered so that it
/// survives a round trip to text or to a store key, but two paths differing
/// only in a trailing slash are equal.
///
/// A path may carry an attributes snapshot attached by the operation that
/// produced it (a listing or an attribute read). The snapshot is not part of
/// the path's identity and is dropped by every derived path.
#[derive(Debug, Clone)]
pub struct ObjectPath {
    absolute: bool,
    segments: Vec<String>,
    trailing_slash: bool,
    attributes: Option<CachedAttributes>,
}

impl ObjectPath {
    /// Parse path text.
    ///
    /// A leading `/` makes the path absolute, in which case the first segment
    /// is the bucket and must be present. Empty segments are dropped.
    ///
    /// # Arguments
    /// * `text` - Path text, e.g. `/bucket/dir/file` or `dir/file`
    ///
    /// # Errors
    /// `InvalidPath` for an absolute path without a bucket segment.
    pub fn parse(text: &str) -> Result<Self, FileSystemError> {
        let absolute: bool = text.starts_with(SEPARATOR);
        let segments: Vec<String> = split_segments(text);
        if absolute && segments.is_empty() {
            return Err(FileSystemError::invalid_path(
                text,
                "absolute path must name a bucket",
            ));
        }
        let trailing_slash: bool = !segments.is_empty() && text.ends_with(SEPARATOR);
        Ok(Self {
            absolute,
            segments,
            trailing_slash,
            attributes: None,
        })
    }

    /// Build the absolute path addressing `key` in `bucket`.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key; a trailing `/` is preserved
    pub fn from_bucket_key(bucket: &str, key: &str) -> Result<Self, FileSystemError> {
        if bucket.is_empty() || bucket.contains(SEPARATOR) {
            return Err(FileSystemError::invalid_path(
                format!("/{}/{}", bucket, key),
                "invalid bucket name",
            ));
        }
        let mut segments: Vec<String> = vec![bucket.to_string()];
        segments.extend(split_segments(key));
        Ok(Self {
            absolute: true,
            trailing_slash: key.ends_with(SEPARATOR),
            segments,
            attributes: None,
        })
    }

    /// The empty relative path.
    pub fn empty() -> Self {
        Self {
            absolute: false,
            segments: Vec::new(),
            trailing_slash: false,
            attributes: None,
        }
    }

    fn derived(absolute: bool, segments: Vec<String>, trailing_slash: bool) -> Self {
        Self {
            absolute,
            trailing_slash: trailing_slash && !segments.is_empty(),
            segments,
            attributes: None,
        }
    }

    /// Whether the path starts at a bucket.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this is the root of a bucket (`/bucket`).
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.len() == 1
    }

    /// Whether the source text ended with `/`.
    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// The segments, bucket first for absolute paths.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn name_count(&self) -> usize {
        self.segments.len()
    }

    /// The segment at `index` as a relative path.
    pub fn segment(&self, index: usize) -> Option<ObjectPath> {
        self.segments
            .get(index)
            .map(|s: &String| Self::derived(false, vec![s.clone()], false))
    }

    /// Bucket name of an absolute path.
    pub fn bucket(&self) -> Option<&str> {
        if self.absolute {
            self.segments.first().map(String::as_str)
        } else {
            None
        }
    }

    fn key_segments(&self) -> &[String] {
        if self.absolute {
            &self.segments[1..]
        } else {
            &self.segments
        }
    }

    /// The store key: key segments joined with `/`, no leading or trailing slash.
    ///
    /// The bucket root has the empty key.
    pub fn key(&self) -> String {
        self.key_segments().join("/")
    }

    /// The key as written, keeping a trailing `/` directory marker.
    pub fn store_key(&self) -> String {
        let key: String = self.key();
        if self.trailing_slash && !key.is_empty() {
            format!("{}/", key)
        } else {
            key
        }
    }

    /// Key of the directory marker object, which is also the listing prefix.
    ///
    /// Empty for the bucket root.
    pub fn directory_key(&self) -> String {
        let key: String = self.key();
        if key.is_empty() {
            key
        } else {
            format!("{}/", key)
        }
    }

    /// Last segment as a relative path.
    pub fn file_name(&self) -> Option<ObjectPath> {
        self.segments
            .last()
            .map(|s: &String| Self::derived(false, vec![s.clone()], self.trailing_slash))
    }

    /// Path without its last segment.
    ///
    /// A bucket root and a single-segment relative path have no parent.
    pub fn parent(&self) -> Option<ObjectPath> {
        if self.segments.len() <= 1 {
            return None;
        }
        let segments: Vec<String> = self.segments[..self.segments.len() - 1].to_vec();
        Some(Self::derived(self.absolute, segments, true))
    }

    /// Bucket root of an absolute path.
    pub fn root(&self) -> Option<ObjectPath> {
        self.bucket()
            .map(|b: &str| Self::derived(true, vec![b.to_string()], false))
    }

    /// Child path with one more segment.
    ///
    /// # Arguments
    /// * `name` - Child segment, without separators
    /// * `directory` - Whether to render the child with a trailing `/`
    pub fn child(&self, name: &str, directory: bool) -> ObjectPath {
        let mut segments: Vec<String> = self.segments.clone();
        segments.push(name.to_string());
        Self::derived(self.absolute, segments, directory)
    }

    /// Resolve `other` against this path.
    ///
    /// An absolute `other` replaces this path, an empty `other` leaves it
    /// unchanged, and otherwise the segments are appended.
    pub fn resolve(&self, other: &ObjectPath) -> ObjectPath {
        if other.absolute {
            return other.without_attributes();
        }
        if other.segments.is_empty() {
            return self.without_attributes();
        }
        let mut segments: Vec<String> = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::derived(self.absolute, segments, other.trailing_slash)
    }

    /// Parse `other` and resolve it against this path.
    pub fn resolve_str(&self, other: &str) -> Result<ObjectPath, FileSystemError> {
        Ok(self.resolve(&ObjectPath::parse(other)?))
    }

    /// Relative path that leads from this path to `other`.
    ///
    /// # Errors
    /// `InvalidPath` if exactly one of the two paths is absolute.
    pub fn relativize(&self, other: &ObjectPath) -> Result<ObjectPath, FileSystemError> {
        if self.absolute != other.absolute {
            return Err(FileSystemError::invalid_path(
                other,
                format!("cannot relativize against {}", self),
            ));
        }
        let common: usize = self
            .segments
            .iter()
            .zip(other.segments.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut segments: Vec<String> = vec!["..".to_string(); self.segments.len() - common];
        segments.extend(other.segments[common..].iter().cloned());
        let trailing: bool = other.trailing_slash && common < other.segments.len();
        Ok(Self::derived(false, segments, trailing))
    }

    /// Whether `other`'s segments are a prefix of this path's.
    pub fn starts_with(&self, other: &ObjectPath) -> bool {
        if self.absolute != other.absolute {
            return false;
        }
        if other.segments.is_empty() {
            return self.segments.is_empty();
        }
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Whether `other`'s segments are a suffix of this path's.
    ///
    /// An absolute `other` matches only the whole path.
    pub fn ends_with(&self, other: &ObjectPath) -> bool {
        if other.absolute {
            return self == other;
        }
        if other.segments.is_empty() {
            return self.segments.is_empty();
        }
        let offset: usize = match self.segments.len().checked_sub(other.segments.len()) {
            Some(offset) => offset,
            None => return false,
        };
        self.segments[offset..] == other.segments[..]
    }

    /// Eliminate `.` segments and fold `..` into the preceding segment.
    ///
    /// `..` never climbs above the bucket of an absolute path.
    pub fn normalize(&self) -> ObjectPath {
        let floor: usize = usize::from(self.absolute);
        let mut segments: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.as_str() {
                "." if segments.len() >= floor => {}
                ".." if segments.len() > floor && segments.last().map_or(false, |s| s != "..") => {
                    segments.pop();
                }
                ".." if self.absolute && segments.len() >= floor => {}
                _ => segments.push(segment.clone()),
            }
        }
        Self::derived(self.absolute, segments, self.trailing_slash)
    }

    /// Attach an attributes snapshot, replacing any previous one.
    pub fn attach_attributes(&mut self, attributes: CachedAttributes) {
        self.attributes = Some(attributes);
    }

    /// Detach and return the attributes snapshot.
    pub fn take_attributes(&mut self) -> Option<CachedAttributes> {
        self.attributes.take()
    }

    /// The attached attributes snapshot.
    pub fn attributes(&self) -> Option<&CachedAttributes> {
        self.attributes.as_ref()
    }

    fn without_attributes(&self) -> ObjectPath {
        Self::derived(self.absolute, self.segments.clone(), self.trailing_slash)
    }
}

fn split_segments(text: &str) -> Vec<String> {
    text.split(SEPARATOR)
        .filter(|s: &&str| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute && self.segments == other.segments
    }
}

impl Eq for ObjectPath {}

impl Hash for ObjectPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.absolute.hash(state);
        self.segments.hash(state);
    }
}

impl PartialOrd for ObjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectPath {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.absolute, &self.segments).cmp(&(other.absolute, &other.segments))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        write!(f, "{}", self.segments.join("/"))?;
        if self.trailing_slash {
            write!(f, "/")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectPath {
    type Err = FileSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
