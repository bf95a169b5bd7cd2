//! Shared setup: a provider whose every filesystem talks to one in-memory store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bucketfs_filesystem::{
    Credentials, EnvironmentSource, FileSystemError, FileSystemProperties, FileSystemProvider,
    ObjectFileSystem, ObjectPath, PropertySources,
};
use bucketfs_storage::{MemoryStorageClient, ObjectStoreClient};
use futures::TryStreamExt;

pub const BUCKET: &str = "bucket";

pub struct Harness {
    pub store: Arc<MemoryStorageClient>,
    pub provider: Arc<FileSystemProvider>,
}

impl Harness {
    /// Open the filesystem for `s3://host/`.
    pub fn open(&self, properties: &FileSystemProperties) -> Arc<ObjectFileSystem> {
        self.provider
            .new_file_system("s3://host/", properties)
            .unwrap()
    }
}

/// Provider with no environment, system properties or defaults file.
pub fn harness() -> Harness {
    harness_with(PropertySources::new())
}

pub fn harness_with(sources: PropertySources) -> Harness {
    harness_with_env(sources, HashMap::new())
}

/// Provider reading `BUCKETFS_*` variables from `env` instead of the process.
pub fn harness_with_env(sources: PropertySources, env: HashMap<String, String>) -> Harness {
    let store: Arc<MemoryStorageClient> = Arc::new(MemoryStorageClient::new());
    let shared: Arc<MemoryStorageClient> = Arc::clone(&store);
    let factory = move |_: &str,
                        _: Option<&Credentials>,
                        _: &FileSystemProperties|
          -> Result<Arc<dyn ObjectStoreClient>, FileSystemError> {
        Ok(Arc::clone(&shared) as Arc<dyn ObjectStoreClient>)
    };
    let env: Arc<dyn EnvironmentSource> = Arc::new(env);
    let provider: Arc<FileSystemProvider> =
        FileSystemProvider::with_sources(Arc::new(factory), sources.with_environment(env));
    Harness { store, provider }
}

/// Last segment of every child of `dir`, in listing order.
pub async fn child_names(fs: &ObjectFileSystem, dir: &str) -> Vec<String> {
    let dir: ObjectPath = fs.get_path(dir).unwrap();
    let children: Vec<ObjectPath> = fs
        .new_directory_stream(&dir)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    children
        .iter()
        .filter_map(|p: &ObjectPath| p.segments().last().cloned())
        .collect()
}
