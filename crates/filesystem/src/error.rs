//! File system error types.

use std::path::PathBuf;

use bucketfs_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during file system operations.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Neither the key, its directory marker, nor any key below it exists.
    #[error("Path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: String,
    },

    /// The target of a create or copy already exists.
    #[error("Path already exists: {path}")]
    AlreadyExists {
        /// The existing path.
        path: String,
    },

    /// Delete of a directory that still has children.
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The directory path.
        path: String,
    },

    /// A directory operation on something that is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The path that was listed.
        path: String,
    },

    /// Capability, option or attribute view that is not implemented.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// What was requested.
        message: String,
    },

    /// An atomic move was requested.
    #[error("Atomic move not supported: {source_path} -> {target_path}")]
    AtomicMoveUnsupported {
        /// Move source.
        source_path: String,
        /// Move target.
        target_path: String,
    },

    /// The store ACL does not grant the requested access.
    #[error("Access denied: {path}")]
    AccessDenied {
        /// The path checked.
        path: String,
    },

    /// Path text that cannot be parsed, or an operation invalid for the path.
    #[error("Invalid path: {path}: {reason}")]
    InvalidPath {
        /// The invalid path.
        path: String,
        /// Why it is invalid.
        reason: String,
    },

    /// URI with the wrong scheme or no usable authority.
    #[error("Invalid URI: {uri}: {reason}")]
    InvalidUri {
        /// The invalid URI.
        uri: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Inconsistent configuration properties.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// A file system is already open for the identity.
    #[error("File system {key} already exists")]
    FileSystemAlreadyExists {
        /// Identity key.
        key: String,
    },

    /// No file system is open for the identity.
    #[error("File system {key} not found; create it with new_file_system first")]
    FileSystemNotFound {
        /// Identity key.
        key: String,
    },

    /// Store failure other than not-found.
    #[error("Problem attempting to operate on {path}: {source}")]
    Storage {
        /// Path under operation.
        path: String,
        /// The underlying store error.
        #[source]
        source: StorageError,
    },

    /// The defaults file exists but cannot be read or parsed.
    #[error("Cannot load defaults file {path}: {message}")]
    DefaultsFile {
        /// File location.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl FileSystemError {
    /// Translate a store error for the path under operation.
    ///
    /// A not-found answer becomes [`FileSystemError::NotFound`]; anything else
    /// is wrapped with the path attached.
    ///
    /// # Arguments
    /// * `source` - The store error
    /// * `path` - Path under operation
    pub fn from_storage(source: StorageError, path: impl ToString) -> Self {
        if source.is_not_found() {
            Self::NotFound {
                path: path.to_string(),
            }
        } else {
            Self::Storage {
                path: path.to_string(),
                source,
            }
        }
    }

    /// Create a `NotFound` error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Create an `Unsupported` error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an `InvalidPath` error.
    pub fn invalid_path(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this is the not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_translation() {
        let err: FileSystemError =
            FileSystemError::from_storage(StorageError::not_found("b", "k"), "/b/k");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Path not found: /b/k");
    }

    #[test]
    fn test_store_fault_keeps_path_and_source() {
        let err: FileSystemError =
            FileSystemError::from_storage(StorageError::service(500, "internal"), "/b/k");
        match &err {
            FileSystemError::Storage { path, source } => {
                assert_eq!(path, "/b/k");
                assert_eq!(*source, StorageError::service(500, "internal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("/b/k"));
    }
}
