//! Object store abstraction for bucketfs.
//!
//! The filesystem layer never talks to a concrete store. It is handed an
//! [`ObjectStoreClient`] and relies only on the bucket/key operations defined
//! there: object CRUD with byte ranges, metadata and ACL lookups, prefix
//! listings with a delimiter, and multipart copies.
//!
//! # Backends
//!
//! - [`MemoryStorageClient`] - everything in process memory, with request
//!   counters and failure injection for tests
//! - Network backends are supplied by the embedding application

mod error;
mod memory;
mod traits;
mod types;

pub use error::StorageError;
pub use memory::{MemoryStorageClient, RequestCounters, StoreOperation};
pub use traits::ObjectStoreClient;
pub use types::{
    AccessControlList, BucketInfo, ByteRange, CompletedPart, CopyObjectRequest, Grant, Grantee,
    ListObjectsPage, ListObjectsRequest, ObjectMetadata, ObjectSummary, Owner, Permission,
    UploadPartCopyRequest, DEFAULT_MAX_KEYS, MAX_UPLOAD_PARTS,
};
