//! The object store client interface.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{
    AccessControlList, BucketInfo, ByteRange, CompletedPart, CopyObjectRequest, ListObjectsPage,
    ListObjectsRequest, ObjectMetadata, UploadPartCopyRequest,
};

/// Low-level object store operations - implemented by each backend.
///
/// Every call may be slow and may fail. Implementations report a missing
/// object or bucket with an error for which [`StorageError::is_not_found`]
/// holds, or with `None` where the signature allows it. Retries and timeouts
/// are the implementation's business; callers never retry.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Look up a bucket.
    ///
    /// # Returns
    /// `None` if the bucket does not exist.
    async fn get_bucket(&self, bucket: &str) -> Result<Option<BucketInfo>, StorageError>;

    /// Create a bucket. Creating an existing bucket owned by the caller succeeds.
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Download an object, or a byte range of it.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key
    /// * `range` - Optional inclusive byte range
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>, StorageError>;

    /// Upload bytes, replacing any existing object.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key
    /// * `data` - Object content
    /// * `metadata` - Content type and user metadata to store; size and
    ///   timestamps are assigned by the store
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Fetch object metadata.
    ///
    /// # Returns
    /// `None` if no object is stored under the key.
    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Fetch the access control list of an object.
    async fn get_object_acl(&self, bucket: &str, key: &str)
        -> Result<AccessControlList, StorageError>;

    /// Server-side copy of a whole object in a single request.
    async fn copy_object(&self, request: &CopyObjectRequest) -> Result<(), StorageError>;

    /// Delete an object. Deleting a key that does not exist succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// List one page of objects and common prefixes.
    async fn list_objects(
        &self,
        request: &ListObjectsRequest,
    ) -> Result<ListObjectsPage, StorageError>;

    /// Start a multipart upload.
    ///
    /// # Returns
    /// The upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError>;

    /// Copy a byte range of an existing object as one part of an upload.
    async fn upload_part_copy(
        &self,
        request: &UploadPartCopyRequest,
    ) -> Result<CompletedPart, StorageError>;

    /// Assemble the uploaded parts into the final object.
    ///
    /// # Arguments
    /// * `parts` - Completed parts in ascending part-number order
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError>;

    /// Discard an upload and every part uploaded so far.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;
}
