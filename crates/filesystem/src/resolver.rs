//! Existence and kind resolution over a store without directories.
//!
//! A path is a regular file when an object is stored at its exact key. It is
//! a directory when a `key/` marker object exists, when it is a bucket root,
//! or when any other key starts with `key/`. Both can hold at once.

use std::ops::{BitOr, BitOrAssign};

use bucketfs_storage::{
    ListObjectsPage, ListObjectsRequest, ObjectMetadata, ObjectStoreClient, ObjectSummary,
};

use crate::attributes::BasicFileAttributes;
use crate::error::FileSystemError;
use crate::path::{ObjectPath, SEPARATOR};

/// Classification of a path as a set of tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryTags(u8);

impl EntryTags {
    /// An object is stored at the exact key.
    pub const FILE: EntryTags = EntryTags(0b01);
    /// The path acts as a directory.
    pub const DIRECTORY: EntryTags = EntryTags(0b10);

    /// No tags.
    pub const fn empty() -> Self {
        EntryTags(0)
    }

    /// Whether every tag of `other` is set.
    pub fn contains(&self, other: EntryTags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Add the tags of `other`.
    pub fn insert(&mut self, other: EntryTags) {
        self.0 |= other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_file(&self) -> bool {
        self.contains(Self::FILE)
    }

    pub fn is_directory(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }
}

impl BitOr for EntryTags {
    type Output = EntryTags;

    fn bitor(self, rhs: EntryTags) -> EntryTags {
        EntryTags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntryTags {
    fn bitor_assign(&mut self, rhs: EntryTags) {
        self.insert(rhs);
    }
}

/// What the store says about a path that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// File and/or directory.
    pub tags: EntryTags,
    /// Summary of the object the answer was derived from. Implicit
    /// directories and bucket roots get a synthetic zero-size summary.
    pub summary: ObjectSummary,
    /// Metadata of that object, when one is stored.
    pub metadata: Option<ObjectMetadata>,
}

impl Resolution {
    /// Basic attributes for the resolved path.
    pub fn basic_attributes(&self) -> BasicFileAttributes {
        let file_key: String = format!("{}/{}", self.summary.bucket, self.summary.key);
        match &self.metadata {
            Some(metadata) => BasicFileAttributes::from_metadata(file_key, metadata, self.tags),
            None => BasicFileAttributes::from_summary(&self.summary, self.tags),
        }
    }
}

/// Resolve an absolute path against the store.
///
/// Looks up, in order: the bucket (root paths only), the exact key, the `key/`
/// marker, and a one-entry listing under `key/`.
///
/// # Arguments
/// * `client` - Store client
/// * `path` - Absolute path
///
/// # Returns
/// `None` if nothing exists at the path in any form.
///
/// # Errors
/// `InvalidPath` for relative paths; store faults other than not-found.
pub async fn resolve(
    client: &dyn ObjectStoreClient,
    path: &ObjectPath,
) -> Result<Option<Resolution>, FileSystemError> {
    let bucket: &str = require_bucket(path)?;

    if path.is_root() {
        let exists: bool = client
            .get_bucket(bucket)
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))?
            .is_some();
        return Ok(exists.then(|| Resolution {
            tags: EntryTags::DIRECTORY,
            summary: ObjectSummary::new(bucket, "", 0),
            metadata: None,
        }));
    }

    let key: String = path.key();
    let exact: Option<ObjectMetadata> = head(client, bucket, &key, path).await?;
    let directory: Option<DirectoryLookup> = lookup_directory(client, bucket, &key, path).await?;

    let resolution: Option<Resolution> = match (exact, directory) {
        (None, None) => None,
        (Some(metadata), directory) => {
            let mut tags: EntryTags = EntryTags::FILE;
            if directory.is_some() {
                tags |= EntryTags::DIRECTORY;
            }
            Some(Resolution {
                tags,
                summary: summary_from_metadata(bucket, &key, &metadata),
                metadata: Some(metadata),
            })
        }
        (None, Some(DirectoryLookup::Marker(marker_key, metadata))) => Some(Resolution {
            tags: EntryTags::DIRECTORY,
            summary: summary_from_metadata(bucket, &marker_key, &metadata),
            metadata: Some(metadata),
        }),
        (None, Some(DirectoryLookup::Implicit)) => Some(Resolution {
            tags: EntryTags::DIRECTORY,
            summary: ObjectSummary::new(bucket, key.as_str(), 0),
            metadata: None,
        }),
    };
    tracing::trace!(path = %path, tags = ?resolution.as_ref().map(|r: &Resolution| r.tags), "resolved");
    Ok(resolution)
}

/// Tags of a path, empty when it does not exist.
pub async fn classify(
    client: &dyn ObjectStoreClient,
    path: &ObjectPath,
) -> Result<EntryTags, FileSystemError> {
    Ok(resolve(client, path)
        .await?
        .map(|r: Resolution| r.tags)
        .unwrap_or_default())
}

/// Whether anything exists at the path.
pub async fn exists(
    client: &dyn ObjectStoreClient,
    path: &ObjectPath,
) -> Result<bool, FileSystemError> {
    Ok(resolve(client, path).await?.is_some())
}

/// Bucket of an absolute path, or `InvalidPath`.
pub(crate) fn require_bucket(path: &ObjectPath) -> Result<&str, FileSystemError> {
    path.bucket()
        .ok_or_else(|| FileSystemError::invalid_path(path, "path must be absolute"))
}

enum DirectoryLookup {
    Marker(String, ObjectMetadata),
    Implicit,
}

async fn lookup_directory(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    key: &str,
    path: &ObjectPath,
) -> Result<Option<DirectoryLookup>, FileSystemError> {
    let marker_key: String = format!("{key}{SEPARATOR}");
    if let Some(metadata) = head(client, bucket, &marker_key, path).await? {
        return Ok(Some(DirectoryLookup::Marker(marker_key, metadata)));
    }

    let request: ListObjectsRequest = ListObjectsRequest::new(bucket, marker_key).with_max_keys(1);
    let page: ListObjectsPage = match client.list_objects(&request).await {
        Ok(page) => page,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(FileSystemError::from_storage(e, path)),
    };
    let has_children: bool = !page.objects.is_empty() || !page.common_prefixes.is_empty();
    Ok(has_children.then_some(DirectoryLookup::Implicit))
}

async fn head(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    key: &str,
    path: &ObjectPath,
) -> Result<Option<ObjectMetadata>, FileSystemError> {
    match client.get_object_metadata(bucket, key).await {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(FileSystemError::from_storage(e, path)),
    }
}

fn summary_from_metadata(bucket: &str, key: &str, metadata: &ObjectMetadata) -> ObjectSummary {
    ObjectSummary {
        bucket: bucket.to_string(),
        key: key.to_string(),
        size: metadata.content_length,
        last_modified: metadata.last_modified,
        etag: metadata.etag.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs_storage::{MemoryStorageClient, StoreOperation};

    fn path(text: &str) -> ObjectPath {
        ObjectPath::parse(text).unwrap()
    }

    #[test]
    fn test_tags_are_not_exclusive() {
        let tags: EntryTags = EntryTags::FILE | EntryTags::DIRECTORY;
        assert!(tags.is_file());
        assert!(tags.is_directory());
        assert!(EntryTags::empty().is_empty());
        assert!(!EntryTags::FILE.is_directory());
    }

    #[tokio::test]
    async fn test_implicit_directories() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.insert_object("bucket", "a/b/c", b"data".to_vec());

        assert_eq!(
            classify(&client, &path("/bucket/a")).await.unwrap(),
            EntryTags::DIRECTORY
        );
        assert_eq!(
            classify(&client, &path("/bucket/a/b")).await.unwrap(),
            EntryTags::DIRECTORY
        );
        assert_eq!(
            classify(&client, &path("/bucket/a/b/c")).await.unwrap(),
            EntryTags::FILE
        );
        assert!(resolve(&client, &path("/bucket/a/b/d"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_file_and_marker_at_same_key() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.insert_object("bucket", "a", b"file".to_vec());
        client.insert_object("bucket", "a/", Vec::new());

        let resolution: Resolution = resolve(&client, &path("/bucket/a")).await.unwrap().unwrap();

        assert!(resolution.tags.is_file());
        assert!(resolution.tags.is_directory());
        assert_eq!(resolution.summary.size, 4);
        assert_eq!(resolution.summary.key, "a");
    }

    #[tokio::test]
    async fn test_marker_stops_lookup() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.insert_object("bucket", "dir/", Vec::new());

        let tags: EntryTags = classify(&client, &path("/bucket/dir")).await.unwrap();

        assert_eq!(tags, EntryTags::DIRECTORY);
        assert_eq!(client.counters().get(StoreOperation::GetObjectMetadata), 2);
        assert_eq!(client.counters().get(StoreOperation::ListObjects), 0);
    }

    #[tokio::test]
    async fn test_bucket_root() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.insert_object("bucket", "x", Vec::new());

        assert_eq!(
            classify(&client, &path("/bucket")).await.unwrap(),
            EntryTags::DIRECTORY
        );
        assert!(!exists(&client, &path("/missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_relative_path_is_rejected() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        let err: FileSystemError = resolve(&client, &path("a/b")).await.unwrap_err();
        assert!(matches!(err, FileSystemError::InvalidPath { .. }));
    }
}
