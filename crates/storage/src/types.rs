//! Request and response types shared by every object store backend.

use std::collections::HashMap;
use std::time::SystemTime;

/// Default number of entries returned by one list call.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Maximum number of parts a multipart upload may have.
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

/// Summary of an object as returned by list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified time reported by the store.
    pub last_modified: Option<SystemTime>,
    /// ETag, if known.
    pub etag: Option<String>,
}

impl ObjectSummary {
    /// Create a summary with no timestamp or etag.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key
    /// * `size` - Object size in bytes
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
        }
    }
}

/// Object metadata from HEAD operations, also used when writing objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub content_length: u64,
    /// Last modified time.
    pub last_modified: Option<SystemTime>,
    /// Content type.
    pub content_type: Option<String>,
    /// ETag.
    pub etag: Option<String>,
    /// User-defined metadata (x-amz-meta-* headers).
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type.
    ///
    /// # Arguments
    /// * `content_type` - MIME type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add one user metadata entry.
    ///
    /// # Arguments
    /// * `key` - Metadata name
    /// * `value` - Metadata value
    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }
}

/// Inclusive byte range, as in an HTTP `Range: bytes=start-end` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Create a range of `length` bytes beginning at `offset`.
    ///
    /// Returns `None` for a zero length. A range running past `u64::MAX` is
    /// clamped there, so `u64::MAX` as length reads to the end of the object.
    pub fn from_offset(offset: u64, length: u64) -> Option<Self> {
        if length == 0 {
            return None;
        }
        Some(Self {
            start: offset,
            end: offset.saturating_add(length - 1),
        })
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parameters for a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsRequest {
    /// Bucket to list.
    pub bucket: String,
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Keys containing the delimiter after the prefix are rolled up into common prefixes.
    pub delimiter: Option<String>,
    /// Maximum number of entries (objects plus common prefixes) per page.
    pub max_keys: usize,
    /// Token from the previous page, if continuing.
    pub continuation_token: Option<String>,
}

impl ListObjectsRequest {
    /// Create a request listing everything under `prefix`.
    ///
    /// # Arguments
    /// * `bucket` - Bucket to list
    /// * `prefix` - Key prefix
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            delimiter: None,
            max_keys: DEFAULT_MAX_KEYS,
            continuation_token: None,
        }
    }

    /// Set the delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Set the page size.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Continue from a previous page.
    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsPage {
    /// Objects directly matching the request.
    pub objects: Vec<ObjectSummary>,
    /// Rolled-up prefixes, each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// Token for the next page; `None` when the listing is complete.
    pub next_continuation_token: Option<String>,
}

impl ListObjectsPage {
    /// Whether more pages follow.
    pub fn is_truncated(&self) -> bool {
        self.next_continuation_token.is_some()
    }
}

/// Server-side copy of a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyObjectRequest {
    /// Source bucket.
    pub source_bucket: String,
    /// Source key.
    pub source_key: String,
    /// Target bucket.
    pub target_bucket: String,
    /// Target key.
    pub target_key: String,
    /// Metadata replacing the source's; `None` keeps the source metadata.
    pub new_metadata: Option<ObjectMetadata>,
}

impl CopyObjectRequest {
    /// Create a copy request that keeps the source metadata.
    pub fn new(
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        target_bucket: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            target_bucket: target_bucket.into(),
            target_key: target_key.into(),
            new_metadata: None,
        }
    }

    /// Replace the target metadata.
    pub fn with_new_metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.new_metadata = Some(metadata);
        self
    }
}

/// Copy of one byte range of an existing object into a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPartCopyRequest {
    /// Source bucket.
    pub source_bucket: String,
    /// Source key.
    pub source_key: String,
    /// Target bucket.
    pub target_bucket: String,
    /// Target key.
    pub target_key: String,
    /// Upload id from `create_multipart_upload`.
    pub upload_id: String,
    /// 1-based part number.
    pub part_number: i32,
    /// Source byte range for this part.
    pub range: ByteRange,
}

/// A finished part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    /// ETag returned for the part.
    pub etag: String,
}

/// Canonical identity of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Canonical id.
    pub id: String,
    /// Human readable name.
    pub display_name: Option<String>,
}

impl Owner {
    /// Create an owner with no display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    /// Name to present to users: the display name, falling back to the id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Bucket information from a bucket lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Bucket owner.
    pub owner: Option<Owner>,
    /// Creation time.
    pub creation_date: Option<SystemTime>,
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    /// A specific account.
    Canonical(Owner),
    /// Anyone, authenticated or not.
    AllUsers,
    /// Any authenticated account.
    AuthenticatedUsers,
    /// An account identified by email address.
    Email(String),
}

/// Permission carried by a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read object data.
    Read,
    /// Write object data.
    Write,
    /// Read the ACL.
    ReadAcp,
    /// Write the ACL.
    WriteAcp,
    /// Every permission.
    FullControl,
}

/// A single ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Who is granted.
    pub grantee: Grantee,
    /// What is granted.
    pub permission: Permission,
}

impl Grant {
    /// Create a grant.
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

/// Access control list of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlList {
    /// Object owner.
    pub owner: Option<Owner>,
    /// Grants in store order.
    pub grants: Vec<Grant>,
}

impl AccessControlList {
    /// ACL granting full control to `owner` only.
    ///
    /// # Arguments
    /// * `owner` - Object owner
    pub fn private(owner: Owner) -> Self {
        Self {
            grants: vec![Grant::new(
                Grantee::Canonical(owner.clone()),
                Permission::FullControl,
            )],
            owner: Some(owner),
        }
    }

    /// Permissions granted to the account with `owner_id`.
    pub fn permissions_for(&self, owner_id: &str) -> Vec<Permission> {
        self.grants
            .iter()
            .filter(|g: &&Grant| matches!(&g.grantee, Grantee::Canonical(o) if o.id == owner_id))
            .map(|g: &Grant| g.permission)
            .collect()
    }

    /// Permissions granted to everyone.
    pub fn public_permissions(&self) -> Vec<Permission> {
        self.grants
            .iter()
            .filter(|g: &&Grant| g.grantee == Grantee::AllUsers)
            .map(|g: &Grant| g.permission)
            .collect()
    }
}
