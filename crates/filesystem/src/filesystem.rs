//! Filesystem operations over one object store.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use bucketfs_storage::{
    AccessControlList, BucketInfo, ByteRange, CopyObjectRequest, ObjectMetadata,
    ObjectStoreClient, ObjectSummary, Owner, Permission,
};
use futures::StreamExt;

use crate::attribute_cache::{AttributeCache, SharedAttributeCache};
use crate::attributes::{
    apply_times, AttributeQuery, AttributeValue, AttributeView, BasicFileAttributes,
    CachedAttributes, FileAttributes, PosixFileAttributes, PosixPermissions,
};
use crate::config::{FileSystemOptions, FileSystemProperties};
use crate::error::FileSystemError;
use crate::listing::DirectoryStream;
use crate::path::ObjectPath;
use crate::registry::FileSystemProvider;
use crate::resolver::{self, require_bucket, EntryTags, Resolution};
use crate::transfer::{self, CopyOption};
use crate::uri::redact_identity;

/// Access modes for [`ObjectFileSystem::check_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

/// A bucket as seen from a filesystem.
#[derive(Debug, Clone)]
pub struct BucketHandle {
    name: String,
    owner: Option<Owner>,
    exists: bool,
    file_system: Weak<ObjectFileSystem>,
}

impl BucketHandle {
    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bucket owner, if the bucket exists and the store reports one.
    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Whether the bucket existed when the handle was taken.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// The filesystem the handle came from, while it is alive.
    pub fn file_system(&self) -> Option<Arc<ObjectFileSystem>> {
        self.file_system.upgrade()
    }
}

/// A hierarchical filesystem over one object store endpoint.
///
/// Obtained from a [`FileSystemProvider`], or built directly with
/// [`ObjectFileSystem::new`] when no registry is wanted.
pub struct ObjectFileSystem {
    key: String,
    endpoint: String,
    default_bucket: Option<String>,
    client: Arc<dyn ObjectStoreClient>,
    attribute_cache: SharedAttributeCache,
    options: FileSystemOptions,
    properties: FileSystemProperties,
    provider: Weak<FileSystemProvider>,
    self_ref: Weak<ObjectFileSystem>,
}

impl std::fmt::Debug for ObjectFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFileSystem")
            .field("key", &redact_identity(&self.key))
            .field("endpoint", &self.endpoint)
            .field("default_bucket", &self.default_bucket)
            .field("options", &self.options)
            .finish()
    }
}

/// Everything a filesystem is built from.
pub(crate) struct FileSystemParts {
    pub key: String,
    pub endpoint: String,
    pub default_bucket: Option<String>,
    pub client: Arc<dyn ObjectStoreClient>,
    pub attribute_cache: SharedAttributeCache,
    pub options: FileSystemOptions,
    pub properties: FileSystemProperties,
    pub provider: Weak<FileSystemProvider>,
}

impl ObjectFileSystem {
    /// Create a filesystem that is not registered with any provider.
    ///
    /// # Arguments
    /// * `key` - Identity key
    /// * `endpoint` - Store host
    /// * `client` - Store client
    /// * `options` - Tunables
    /// * `attribute_cache` - Freshness policy for attribute snapshots
    pub fn new(
        key: impl Into<String>,
        endpoint: impl Into<String>,
        client: Arc<dyn ObjectStoreClient>,
        options: FileSystemOptions,
        attribute_cache: SharedAttributeCache,
    ) -> Arc<Self> {
        Self::from_parts(FileSystemParts {
            key: key.into(),
            endpoint: endpoint.into(),
            default_bucket: None,
            client,
            attribute_cache,
            options,
            properties: FileSystemProperties::new(),
            provider: Weak::new(),
        })
    }

    pub(crate) fn from_parts(parts: FileSystemParts) -> Arc<Self> {
        Arc::new_cyclic(|self_ref: &Weak<ObjectFileSystem>| Self {
            key: parts.key,
            endpoint: parts.endpoint,
            default_bucket: parts.default_bucket,
            client: parts.client,
            attribute_cache: parts.attribute_cache,
            options: parts.options,
            properties: parts.properties,
            provider: parts.provider,
            self_ref: self_ref.clone(),
        })
    }

    /// Identity key in the provider registry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store host.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bucket named by the URI the filesystem was opened with.
    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    /// Store client.
    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    /// Tunables resolved when the filesystem was opened.
    pub fn options(&self) -> &FileSystemOptions {
        &self.options
    }

    /// Resolved properties the filesystem was opened with.
    pub fn properties(&self) -> &FileSystemProperties {
        &self.properties
    }

    /// Current attribute cache policy.
    pub fn attribute_cache(&self) -> AttributeCache {
        self.attribute_cache.get()
    }

    /// Parse a path of this filesystem.
    pub fn get_path(&self, text: &str) -> Result<ObjectPath, FileSystemError> {
        ObjectPath::parse(text)
    }

    /// Close the filesystem, freeing its identity key in the provider.
    ///
    /// # Returns
    /// false if it was not open.
    pub fn close(&self) -> bool {
        match self.provider.upgrade() {
            Some(provider) => provider.close(self),
            None => false,
        }
    }

    /// Whether the provider still holds this instance.
    pub fn is_open(&self) -> bool {
        self.provider
            .upgrade()
            .map_or(false, |provider: Arc<FileSystemProvider>| provider.is_open(self))
    }

    /// Look up the bucket of an absolute path.
    pub async fn bucket(&self, path: &ObjectPath) -> Result<BucketHandle, FileSystemError> {
        let name: &str = require_bucket(path)?;
        let info: Option<BucketInfo> = self
            .client
            .get_bucket(name)
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))?;
        Ok(BucketHandle {
            name: name.to_string(),
            exists: info.is_some(),
            owner: info.and_then(|i: BucketInfo| i.owner),
            file_system: self.self_ref.clone(),
        })
    }

    /// Existence and kind of a path.
    ///
    /// # Returns
    /// `None` if nothing exists at the path.
    pub async fn resolve(&self, path: &ObjectPath) -> Result<Option<Resolution>, FileSystemError> {
        resolver::resolve(self.client.as_ref(), path).await
    }

    /// Whether anything exists at the path.
    pub async fn exists(&self, path: &ObjectPath) -> Result<bool, FileSystemError> {
        resolver::exists(self.client.as_ref(), path).await
    }

    /// Whether the path is a directory. Missing paths are not.
    pub async fn is_directory(&self, path: &ObjectPath) -> Result<bool, FileSystemError> {
        Ok(self.classify(path).await?.is_directory())
    }

    /// Whether an object is stored at the path's exact key.
    pub async fn is_regular_file(&self, path: &ObjectPath) -> Result<bool, FileSystemError> {
        Ok(self.classify(path).await?.is_file())
    }

    async fn classify(&self, path: &ObjectPath) -> Result<EntryTags, FileSystemError> {
        resolver::classify(self.client.as_ref(), path).await
    }

    /// List the children of a directory.
    ///
    /// # Errors
    /// `NotFound` if the path does not exist, `NotADirectory` if it is only a
    /// regular file.
    pub async fn new_directory_stream(
        &self,
        directory: &ObjectPath,
    ) -> Result<DirectoryStream, FileSystemError> {
        let tags: EntryTags = self.classify(directory).await?;
        if tags.is_empty() {
            return Err(FileSystemError::not_found(directory));
        }
        if !tags.is_directory() {
            return Err(FileSystemError::NotADirectory {
                path: directory.to_string(),
            });
        }
        Ok(DirectoryStream::new(
            Arc::clone(&self.client),
            directory.clone(),
            self.options.list_page_size,
        ))
    }

    /// Read attributes of one view.
    ///
    /// A fresh snapshot attached to the path is taken off the path and
    /// returned, so the next read goes to the store. Otherwise the attributes
    /// are fetched, attached to the path and returned.
    ///
    /// # Arguments
    /// * `path` - Absolute path; receives the fetched snapshot
    /// * `view` - Basic or posix
    pub async fn read_attributes(
        &self,
        path: &mut ObjectPath,
        view: AttributeView,
    ) -> Result<FileAttributes, FileSystemError> {
        let cache: AttributeCache = self.attribute_cache.get();
        let usable: bool = path.attributes().map_or(false, |s: &CachedAttributes| {
            (view == AttributeView::Basic || s.view() == AttributeView::Posix)
                && cache.is_in_time(Some(s))
        });
        if usable {
            if let Some(snapshot) = path.take_attributes() {
                tracing::trace!(path = %path, "attribute snapshot used");
                return Ok(snapshot.into_attributes());
            }
        }

        tracing::trace!(path = %path, ?view, "fetching attributes");
        let attributes: FileAttributes = self.fetch_attributes(path, view).await?;
        path.attach_attributes(CachedAttributes::fetched_now(attributes.clone()));
        Ok(attributes)
    }

    /// Read attributes selected by a query such as `"*"`, `"posix:*"` or
    /// `"size,lastModifiedTime"`.
    pub async fn read_attributes_map(
        &self,
        path: &mut ObjectPath,
        query: &str,
    ) -> Result<BTreeMap<String, AttributeValue>, FileSystemError> {
        let query: AttributeQuery = AttributeQuery::parse(query)?;
        let attributes: FileAttributes = self.read_attributes(path, query.view).await?;
        Ok(query.select(&attributes))
    }

    /// Setting single attributes is not supported; use [`Self::set_times`].
    pub async fn set_attribute(
        &self,
        path: &ObjectPath,
        name: &str,
        _value: AttributeValue,
    ) -> Result<(), FileSystemError> {
        Err(FileSystemError::unsupported(format!(
            "setting attribute {name} on {path}"
        )))
    }

    async fn fetch_attributes(
        &self,
        path: &ObjectPath,
        view: AttributeView,
    ) -> Result<FileAttributes, FileSystemError> {
        let resolution: Resolution = self
            .resolve(path)
            .await?
            .ok_or_else(|| FileSystemError::not_found(path))?;
        let basic: BasicFileAttributes = resolution.basic_attributes();
        if view == AttributeView::Basic {
            return Ok(FileAttributes::Basic(basic));
        }

        let bucket: BucketHandle = self.bucket(path).await?;
        let owner_id: Option<&str> = bucket.owner().map(|o: &Owner| o.id.as_str());
        let permissions: PosixPermissions = match &resolution.metadata {
            Some(_) => {
                let acl: AccessControlList = self.object_acl(path, &resolution).await?;
                PosixPermissions::from_acl(&acl, owner_id)
            }
            // Implicit directories and bucket roots have no ACL of their own.
            None => PosixPermissions::from_mode(
                PosixPermissions::OWNER_READ | PosixPermissions::OWNER_WRITE,
            ),
        };
        Ok(FileAttributes::Posix(PosixFileAttributes {
            basic,
            owner: bucket.owner().map(|o: &Owner| o.name().to_string()),
            group: None,
            permissions,
        }))
    }

    async fn object_acl(
        &self,
        path: &ObjectPath,
        resolution: &Resolution,
    ) -> Result<AccessControlList, FileSystemError> {
        self.client
            .get_object_acl(&resolution.summary.bucket, &resolution.summary.key)
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))
    }

    /// Check that the path exists and that the bucket owner may access it.
    ///
    /// With no modes only existence is checked. Read and write need the
    /// matching grant (or full control) for the bucket owner on the object.
    /// Execute is never granted.
    pub async fn check_access(
        &self,
        path: &ObjectPath,
        modes: &[AccessMode],
    ) -> Result<(), FileSystemError> {
        let resolution: Resolution = self
            .resolve(path)
            .await?
            .ok_or_else(|| FileSystemError::not_found(path))?;
        if modes.is_empty() {
            return Ok(());
        }
        if modes.contains(&AccessMode::Execute) {
            return Err(FileSystemError::AccessDenied {
                path: path.to_string(),
            });
        }
        if resolution.metadata.is_none() {
            return Ok(());
        }

        let bucket: BucketHandle = self.bucket(path).await?;
        let acl: AccessControlList = self.object_acl(path, &resolution).await?;
        let granted: Vec<Permission> = match bucket.owner() {
            Some(owner) => acl.permissions_for(&owner.id),
            None => Vec::new(),
        };
        let allows = |needed: Permission| -> bool {
            granted.contains(&needed) || granted.contains(&Permission::FullControl)
        };
        for mode in modes {
            let needed: Permission = match mode {
                AccessMode::Read => Permission::Read,
                AccessMode::Write => Permission::Write,
                AccessMode::Execute => {
                    return Err(FileSystemError::AccessDenied {
                        path: path.to_string(),
                    })
                }
            };
            if !allows(needed) {
                return Err(FileSystemError::AccessDenied {
                    path: path.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Create a directory marker, creating the bucket first if needed.
    ///
    /// # Errors
    /// `AlreadyExists` if anything exists at the path.
    pub async fn create_directory(&self, path: &ObjectPath) -> Result<(), FileSystemError> {
        if self.exists(path).await? {
            return Err(FileSystemError::AlreadyExists {
                path: path.to_string(),
            });
        }
        let bucket: BucketHandle = self.bucket(path).await?;
        if !bucket.exists() {
            tracing::info!("Creating bucket {}", bucket.name());
            self.client
                .create_bucket(bucket.name())
                .await
                .map_err(|e| FileSystemError::from_storage(e, path))?;
        }
        if path.is_root() {
            return Ok(());
        }
        self.client
            .put_object(
                bucket.name(),
                &path.directory_key(),
                &[],
                &ObjectMetadata::default(),
            )
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))
    }

    /// Read a whole object.
    pub async fn read(&self, path: &ObjectPath) -> Result<Vec<u8>, FileSystemError> {
        let (bucket, key): (&str, String) = object_location(path)?;
        self.client
            .get_object(bucket, &key, None)
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))
    }

    /// Read `length` bytes starting at `offset`.
    pub async fn read_range(
        &self,
        path: &ObjectPath,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FileSystemError> {
        let (bucket, key): (&str, String) = object_location(path)?;
        let Some(range) = ByteRange::from_offset(offset, length) else {
            return Ok(Vec::new());
        };
        self.client
            .get_object(bucket, &key, Some(range))
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))
    }

    /// Store `data` at the path, replacing any existing object.
    pub async fn write(&self, path: &ObjectPath, data: &[u8]) -> Result<(), FileSystemError> {
        let (bucket, key): (&str, String) = object_location(path)?;
        self.client
            .put_object(bucket, &key, data, &ObjectMetadata::default())
            .await
            .map_err(|e| FileSystemError::from_storage(e, path))
    }

    /// Record timestamps on a stored object by copying it onto itself.
    ///
    /// `None` leaves the corresponding time unchanged.
    pub async fn set_times(
        &self,
        path: &ObjectPath,
        last_modified: Option<SystemTime>,
        last_access: Option<SystemTime>,
        creation: Option<SystemTime>,
    ) -> Result<(), FileSystemError> {
        let resolution: Resolution = self
            .resolve(path)
            .await?
            .ok_or_else(|| FileSystemError::not_found(path))?;
        let Some(mut metadata) = resolution.metadata else {
            return Err(FileSystemError::unsupported(format!(
                "{path} has no stored object to carry timestamps"
            )));
        };
        apply_times(&mut metadata, last_modified, last_access, creation);

        let summary: &ObjectSummary = &resolution.summary;
        let request: CopyObjectRequest = CopyObjectRequest::new(
            summary.bucket.as_str(),
            summary.key.as_str(),
            summary.bucket.as_str(),
            summary.key.as_str(),
        );
        transfer::copy_object(
            &self.client,
            request,
            metadata,
            self.options.copy_part_size,
            path,
        )
        .await
    }

    /// Copy a regular file.
    ///
    /// Copying a path onto itself does nothing. Directories cannot be copied.
    ///
    /// # Arguments
    /// * `source` - Existing file
    /// * `target` - Destination
    /// * `options` - Only [`CopyOption::ReplaceExisting`] is accepted
    pub async fn copy(
        &self,
        source: &ObjectPath,
        target: &ObjectPath,
        options: &[CopyOption],
    ) -> Result<(), FileSystemError> {
        if self.is_same_file(source, target) {
            return Ok(());
        }
        let source_bucket: &str = require_bucket(source)?;
        let target_bucket: &str = require_bucket(target)?;

        let source_tags: EntryTags = self.classify(source).await?;
        let target_tags: EntryTags = self.classify(target).await?;
        if source_tags.is_directory() || target_tags.is_directory() {
            return Err(FileSystemError::unsupported(format!(
                "copying directories: {source} -> {target}"
            )));
        }
        let replace_existing: bool = transfer::check_copy_options(options)?;
        if !target_tags.is_empty() && !replace_existing {
            return Err(FileSystemError::AlreadyExists {
                path: target.to_string(),
            });
        }

        let source_key: String = source.key();
        let metadata: ObjectMetadata = self
            .client
            .get_object_metadata(source_bucket, &source_key)
            .await
            .map_err(|e| FileSystemError::from_storage(e, source))?
            .ok_or_else(|| FileSystemError::not_found(source))?;

        let request: CopyObjectRequest =
            CopyObjectRequest::new(source_bucket, source_key, target_bucket, target.key());
        transfer::copy_object(
            &self.client,
            request,
            metadata,
            self.options.copy_part_size,
            source,
        )
        .await
    }

    /// Move a regular file: copy, then delete the source.
    ///
    /// Not atomic. If the delete fails both copies remain. Moving a path
    /// onto itself changes nothing.
    ///
    /// # Errors
    /// `AtomicMoveUnsupported` if [`CopyOption::AtomicMove`] is requested,
    /// before anything is changed.
    pub async fn move_path(
        &self,
        source: &ObjectPath,
        target: &ObjectPath,
        options: &[CopyOption],
    ) -> Result<(), FileSystemError> {
        if options.contains(&CopyOption::AtomicMove) {
            return Err(FileSystemError::AtomicMoveUnsupported {
                source_path: source.to_string(),
                target_path: target.to_string(),
            });
        }
        if self.is_same_file(source, target) {
            return Ok(());
        }
        self.copy(source, target, options).await?;
        self.delete(source).await
    }

    /// Delete a file or an empty directory.
    ///
    /// # Errors
    /// `NotFound` if nothing exists, `DirectoryNotEmpty` if the path has
    /// children.
    pub async fn delete(&self, path: &ObjectPath) -> Result<(), FileSystemError> {
        let bucket: &str = require_bucket(path)?;
        if path.is_root() {
            return Err(FileSystemError::invalid_path(
                path,
                "a bucket root cannot be deleted",
            ));
        }
        let tags: EntryTags = self.classify(path).await?;
        if tags.is_empty() {
            return Err(FileSystemError::not_found(path));
        }
        if tags.is_directory() {
            let mut children: DirectoryStream =
                DirectoryStream::new(Arc::clone(&self.client), path.clone(), 1);
            if let Some(first) = children.next().await {
                first?;
                return Err(FileSystemError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
        }
        transfer::delete_key_and_marker(self.client.as_ref(), bucket, &path.key(), path).await
    }

    /// Delete the path's object and directory marker without checking for
    /// them first.
    ///
    /// # Returns
    /// Always true; whether anything existed is not determined.
    pub async fn delete_if_exists(&self, path: &ObjectPath) -> Result<bool, FileSystemError> {
        let bucket: &str = require_bucket(path)?;
        transfer::delete_key_and_marker(self.client.as_ref(), bucket, &path.key(), path).await?;
        Ok(true)
    }

    /// Whether two paths name the same object: both absolute and equal.
    pub fn is_same_file(&self, a: &ObjectPath, b: &ObjectPath) -> bool {
        a.is_absolute() && b.is_absolute() && a == b
    }

    /// Stores have no hidden files.
    pub fn is_hidden(&self, _path: &ObjectPath) -> bool {
        false
    }
}

/// Bucket and key of a path addressing an object.
fn object_location(path: &ObjectPath) -> Result<(&str, String), FileSystemError> {
    let bucket: &str = require_bucket(path)?;
    if path.is_root() {
        return Err(FileSystemError::invalid_path(
            path,
            "a bucket root is not a file",
        ));
    }
    Ok((bucket, path.key()))
}
