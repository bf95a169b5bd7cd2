//! In-memory object store.
//!
//! Keeps every bucket in a sorted map so listings come back in key order, as
//! they do from a real store. Each trait call is counted per operation so
//! tests can assert how many requests a filesystem operation issued, and
//! failures can be injected per operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::StorageError;
use crate::traits::ObjectStoreClient;
use crate::types::{
    AccessControlList, BucketInfo, ByteRange, CompletedPart, CopyObjectRequest, ListObjectsPage,
    ListObjectsRequest, ObjectMetadata, ObjectSummary, Owner, UploadPartCopyRequest,
    DEFAULT_MAX_KEYS,
};

/// Store operations, one per [`ObjectStoreClient`] method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetBucket,
    CreateBucket,
    GetObject,
    PutObject,
    GetObjectMetadata,
    GetObjectAcl,
    CopyObject,
    DeleteObject,
    ListObjects,
    CreateMultipartUpload,
    UploadPartCopy,
    CompleteMultipartUpload,
    AbortMultipartUpload,
}

/// Per-operation request counts.
#[derive(Debug, Default)]
pub struct RequestCounters {
    counts: Mutex<HashMap<StoreOperation, u64>>,
}

impl RequestCounters {
    fn record(&self, operation: StoreOperation) {
        *self.counts.lock().entry(operation).or_insert(0) += 1;
    }

    /// Number of calls made for `operation`.
    pub fn get(&self, operation: StoreOperation) -> u64 {
        self.counts.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total(&self) -> u64 {
        self.counts.lock().values().sum()
    }

    /// Reset every count to zero.
    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    metadata: ObjectMetadata,
    acl: AccessControlList,
}

#[derive(Debug)]
struct MemoryBucket {
    info: BucketInfo,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<i32, Vec<u8>>,
}

/// Object store held entirely in memory.
#[derive(Debug)]
pub struct MemoryStorageClient {
    owner: Owner,
    buckets: RwLock<HashMap<String, MemoryBucket>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_upload_id: AtomicU64,
    counters: RequestCounters,
    failures: Mutex<HashMap<StoreOperation, StorageError>>,
}

impl Default for MemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageClient {
    /// Create an empty store owned by a default account.
    pub fn new() -> Self {
        Self::with_owner(Owner {
            id: "memory-owner".to_string(),
            display_name: Some("memory".to_string()),
        })
    }

    /// Create an empty store whose buckets and objects belong to `owner`.
    ///
    /// # Arguments
    /// * `owner` - Account owning everything created through this client
    pub fn with_owner(owner: Owner) -> Self {
        Self {
            owner,
            buckets: RwLock::new(HashMap::new()),
            uploads: Mutex::new(HashMap::new()),
            next_upload_id: AtomicU64::new(1),
            counters: RequestCounters::default(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Account owning the buckets of this store.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Request counters.
    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    /// Make every subsequent call of `operation` fail with `error`.
    ///
    /// # Arguments
    /// * `operation` - Operation to fail
    /// * `error` - Error returned by each failing call
    pub fn fail_on(&self, operation: StoreOperation, error: StorageError) {
        self.failures.lock().insert(operation, error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Store an object directly, creating the bucket if needed. Not counted.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key
    /// * `data` - Object content
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        let mut buckets = self.buckets.write();
        let entry: &mut MemoryBucket = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| self.new_bucket(bucket));
        let data: Vec<u8> = data.into();
        let object: StoredObject = self.new_object(data, &ObjectMetadata::default());
        entry.objects.insert(key.to_string(), object);
    }

    /// Replace the ACL of a stored object. Not counted.
    ///
    /// # Returns
    /// false if the object does not exist.
    pub fn set_object_acl(&self, bucket: &str, key: &str, acl: AccessControlList) -> bool {
        let mut buckets = self.buckets.write();
        match buckets
            .get_mut(bucket)
            .and_then(|b: &mut MemoryBucket| b.objects.get_mut(key))
        {
            Some(object) => {
                object.acl = acl;
                true
            }
            None => false,
        }
    }

    /// Keys stored in `bucket`, in order. Not counted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(bucket)
            .map(|b: &MemoryBucket| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content of a stored object. Not counted.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b: &MemoryBucket| b.objects.get(key))
            .map(|o: &StoredObject| o.data.clone())
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().len()
    }

    fn begin(&self, operation: StoreOperation) -> Result<(), StorageError> {
        self.counters.record(operation);
        match self.failures.lock().get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn new_bucket(&self, name: &str) -> MemoryBucket {
        MemoryBucket {
            info: BucketInfo {
                name: name.to_string(),
                owner: Some(self.owner.clone()),
                creation_date: Some(SystemTime::now()),
            },
            objects: BTreeMap::new(),
        }
    }

    fn new_object(&self, data: Vec<u8>, metadata: &ObjectMetadata) -> StoredObject {
        let mut metadata: ObjectMetadata = metadata.clone();
        metadata.content_length = data.len() as u64;
        metadata.last_modified = Some(SystemTime::now());
        metadata.etag = Some(format!("\"{:016x}\"", fingerprint(&data)));
        StoredObject {
            data,
            metadata,
            acl: AccessControlList::private(self.owner.clone()),
        }
    }

    fn read_source(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let buckets = self.buckets.read();
        let source: &MemoryBucket = buckets.get(bucket).ok_or_else(|| StorageError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        source
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    fn store(&self, bucket: &str, key: &str, object: StoredObject) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write();
        let target: &mut MemoryBucket =
            buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::NoSuchBucket {
                    bucket: bucket.to_string(),
                })?;
        target.objects.insert(key.to_string(), object);
        Ok(())
    }
}

/// FNV-1a, used for synthetic etags.
fn fingerprint(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash: u64, byte: &u8| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn slice_range(data: &[u8], range: ByteRange) -> Result<Vec<u8>, StorageError> {
    let size: u64 = data.len() as u64;
    if range.start >= size || range.end < range.start {
        return Err(StorageError::InvalidRange {
            start: range.start,
            end: range.end,
            size,
        });
    }
    let end: u64 = range.end.min(size - 1);
    Ok(data[range.start as usize..=end as usize].to_vec())
}

#[async_trait]
impl ObjectStoreClient for MemoryStorageClient {
    async fn get_bucket(&self, bucket: &str) -> Result<Option<BucketInfo>, StorageError> {
        self.begin(StoreOperation::GetBucket)?;
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .map(|b: &MemoryBucket| b.info.clone()))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.begin(StoreOperation::CreateBucket)?;
        let mut buckets = self.buckets.write();
        if !buckets.contains_key(bucket) {
            tracing::debug!("memory store: creating bucket {}", bucket);
            buckets.insert(bucket.to_string(), self.new_bucket(bucket));
        }
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>, StorageError> {
        self.begin(StoreOperation::GetObject)?;
        let object: StoredObject = self.read_source(bucket, key)?;
        match range {
            Some(range) => slice_range(&object.data, range),
            None => Ok(object.data),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        self.begin(StoreOperation::PutObject)?;
        let object: StoredObject = self.new_object(data.to_vec(), metadata);
        self.store(bucket, key, object)
    }

    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        self.begin(StoreOperation::GetObjectMetadata)?;
        let buckets = self.buckets.read();
        let found: &MemoryBucket = buckets.get(bucket).ok_or_else(|| StorageError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        Ok(found
            .objects
            .get(key)
            .map(|o: &StoredObject| o.metadata.clone()))
    }

    async fn get_object_acl(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<AccessControlList, StorageError> {
        self.begin(StoreOperation::GetObjectAcl)?;
        Ok(self.read_source(bucket, key)?.acl)
    }

    async fn copy_object(&self, request: &CopyObjectRequest) -> Result<(), StorageError> {
        self.begin(StoreOperation::CopyObject)?;
        let source: StoredObject = self.read_source(&request.source_bucket, &request.source_key)?;
        let metadata: &ObjectMetadata = request.new_metadata.as_ref().unwrap_or(&source.metadata);
        let copy: StoredObject = self.new_object(source.data.clone(), metadata);
        self.store(&request.target_bucket, &request.target_key, copy)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.begin(StoreOperation::DeleteObject)?;
        let mut buckets = self.buckets.write();
        let found: &mut MemoryBucket =
            buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::NoSuchBucket {
                    bucket: bucket.to_string(),
                })?;
        found.objects.remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        request: &ListObjectsRequest,
    ) -> Result<ListObjectsPage, StorageError> {
        self.begin(StoreOperation::ListObjects)?;
        let buckets = self.buckets.read();
        let found: &MemoryBucket =
            buckets
                .get(&request.bucket)
                .ok_or_else(|| StorageError::NoSuchBucket {
                    bucket: request.bucket.clone(),
                })?;

        let prefix: &str = &request.prefix;
        let delimiter: Option<&str> = request.delimiter.as_deref().filter(|d: &&str| !d.is_empty());
        let max_keys: usize = if request.max_keys == 0 {
            DEFAULT_MAX_KEYS
        } else {
            request.max_keys
        };

        let mut page: ListObjectsPage = ListObjectsPage::default();
        let mut returned: usize = 0;
        let mut last_marker: Option<String> = None;

        for (key, object) in found.objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(token) = request.continuation_token.as_deref() {
                if key.as_str() <= token {
                    continue;
                }
                // A token naming a rolled-up prefix skips everything beneath it.
                let rolled_up: bool = delimiter.map_or(false, |d: &str| {
                    token.len() > prefix.len() && token.ends_with(d)
                });
                if rolled_up && key.starts_with(token) {
                    continue;
                }
            }

            let rest: &str = &key[prefix.len()..];
            let common_prefix: Option<String> = delimiter.and_then(|d: &str| {
                rest.find(d)
                    .map(|idx: usize| format!("{}{}", prefix, &rest[..idx + d.len()]))
            });

            if let Some(common) = common_prefix {
                if page.common_prefixes.last() == Some(&common) {
                    continue;
                }
                if returned == max_keys {
                    page.next_continuation_token = last_marker;
                    return Ok(page);
                }
                page.common_prefixes.push(common.clone());
                last_marker = Some(common);
            } else {
                if returned == max_keys {
                    page.next_continuation_token = last_marker;
                    return Ok(page);
                }
                page.objects.push(ObjectSummary {
                    bucket: request.bucket.clone(),
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: object.metadata.last_modified,
                    etag: object.metadata.etag.clone(),
                });
                last_marker = Some(key.clone());
            }
            returned += 1;
        }

        Ok(page)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError> {
        self.begin(StoreOperation::CreateMultipartUpload)?;
        if !self.buckets.read().contains_key(bucket) {
            return Err(StorageError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let upload_id: String = format!(
            "upload-{}",
            self.next_upload_id.fetch_add(1, Ordering::SeqCst)
        );
        self.uploads.lock().insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part_copy(
        &self,
        request: &UploadPartCopyRequest,
    ) -> Result<CompletedPart, StorageError> {
        self.begin(StoreOperation::UploadPartCopy)?;
        let source: StoredObject = self.read_source(&request.source_bucket, &request.source_key)?;
        let data: Vec<u8> = slice_range(&source.data, request.range)?;
        let etag: String = format!("\"{:016x}\"", fingerprint(&data));

        let mut uploads = self.uploads.lock();
        let upload: &mut PendingUpload =
            uploads
                .get_mut(&request.upload_id)
                .ok_or_else(|| StorageError::NoSuchUpload {
                    upload_id: request.upload_id.clone(),
                })?;
        upload.parts.insert(request.part_number, data);

        Ok(CompletedPart {
            part_number: request.part_number,
            etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        self.begin(StoreOperation::CompleteMultipartUpload)?;
        let upload: PendingUpload = {
            let mut uploads = self.uploads.lock();
            match uploads.get(upload_id) {
                Some(pending) if pending.bucket == bucket && pending.key == key => {}
                _ => {
                    return Err(StorageError::NoSuchUpload {
                        upload_id: upload_id.to_string(),
                    })
                }
            }
            uploads
                .remove(upload_id)
                .ok_or_else(|| StorageError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                })?
        };

        let mut data: Vec<u8> = Vec::new();
        for part in parts {
            let bytes: &Vec<u8> =
                upload
                    .parts
                    .get(&part.part_number)
                    .ok_or_else(|| StorageError::Service {
                        status: 400,
                        message: format!("InvalidPart: part {} was never uploaded", part.part_number),
                    })?;
            data.extend_from_slice(bytes);
        }

        let object: StoredObject = self.new_object(data, &upload.metadata);
        self.store(bucket, key, object)
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.begin(StoreOperation::AbortMultipartUpload)?;
        match self.uploads.lock().remove(upload_id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            }),
        }
    }
}
