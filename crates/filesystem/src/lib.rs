//! Hierarchical filesystem over a flat object store.
//!
//! Buckets become top-level directories and `/`-separated keys become paths.
//! The store has no directories of its own, so they are inferred: a key
//! ending in `/` marks a directory, and so does any key that other keys use
//! as a prefix. A key can be a regular file and a directory at the same time.
//!
//! # Components
//!
//! - [`ObjectPath`] - path parsing, resolution and store key mapping
//! - [`resolver`] - existence and kind of a path ([`EntryTags`])
//! - [`DirectoryStream`] - lazy, paginated directory listing
//! - [`AttributeCache`] - freshness policy for attribute snapshots
//! - [`transfer`] - single-request and parallel multipart copies, dual delete
//! - [`ObjectFileSystem`] - the filesystem operations
//! - [`FileSystemProvider`] - registry of open filesystems and property
//!   resolution
//!
//! # Example
//!
//! ```ignore
//! let provider = FileSystemProvider::new(factory);
//! let fs = provider.new_file_system("s3://s3.amazonaws.com/", &FileSystemProperties::new())?;
//! let dir = fs.get_path("/bucket/reports")?;
//! let mut children = fs.new_directory_stream(&dir).await?;
//! while let Some(child) = children.try_next().await? {
//!     println!("{child}");
//! }
//! ```

pub mod attribute_cache;
pub mod attributes;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod listing;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod transfer;
pub mod uri;

pub use attribute_cache::{AttributeCache, SharedAttributeCache, DEFAULT_ATTRIBUTE_CACHE_TTL};
pub use attributes::{
    AttributeQuery, AttributeValue, AttributeView, BasicFileAttributes, CachedAttributes,
    FileAttributes, PosixFileAttributes, PosixPermissions,
};
pub use config::{
    properties, Credentials, EnvironmentSource, FileSystemOptions, FileSystemProperties,
    ProcessEnvironment, PropertySources, DEFAULT_LIST_PAGE_SIZE,
};
pub use error::FileSystemError;
pub use filesystem::{AccessMode, BucketHandle, ObjectFileSystem};
pub use listing::DirectoryStream;
pub use path::ObjectPath;
pub use registry::{FileSystemProvider, StorageClientFactory};
pub use resolver::{EntryTags, Resolution};
pub use transfer::{
    CopyOption, CopyStrategy, DEFAULT_COPY_PART_SIZE, LARGE_OBJECT_THRESHOLD,
    PARALLEL_SIZE_THRESHOLD,
};
pub use uri::{FileSystemUri, DEFAULT_ENDPOINT, SCHEME};
