//! Storage error types.

use thiserror::Error;

/// Errors reported by an object store client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// No object is stored under the key.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound {
        /// Bucket that was queried.
        bucket: String,
        /// Key that was queried.
        key: String,
    },

    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    NoSuchBucket {
        /// Bucket name.
        bucket: String,
    },

    /// The multipart upload id is unknown (completed, aborted or never created).
    #[error("Multipart upload not found: {upload_id}")]
    NoSuchUpload {
        /// Upload id.
        upload_id: String,
    },

    /// The caller may not access the object.
    #[error("Access denied: s3://{bucket}/{key}")]
    AccessDenied {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },

    /// The requested byte range lies outside the object.
    #[error("Invalid range {start}-{end} for object of {size} bytes")]
    InvalidRange {
        /// First requested byte.
        start: u64,
        /// Last requested byte (inclusive).
        end: u64,
        /// Object size.
        size: u64,
    },

    /// Any other service-side failure.
    #[error("Store error (status {status}): {message}")]
    Service {
        /// HTTP-like status code reported by the store.
        status: u16,
        /// Error message.
        message: String,
    },

    /// A parallel transfer worker panicked or was cancelled before finishing.
    #[error("Transfer interrupted: {message}")]
    TransferInterrupted {
        /// Description of the interruption.
        message: String,
    },

    /// Client configuration problem.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl StorageError {
    /// Whether this error is the store's "404" answer.
    ///
    /// Callers must treat not-found distinctly from every other failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. }
                | StorageError::NoSuchBucket { .. }
                | StorageError::NoSuchUpload { .. }
        )
    }

    /// Create a `NotFound` error.
    ///
    /// # Arguments
    /// * `bucket` - Bucket that was queried
    /// * `key` - Key that was queried
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create a generic service error.
    ///
    /// # Arguments
    /// * `status` - Status code reported by the store
    /// * `message` - Error message
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }
}
