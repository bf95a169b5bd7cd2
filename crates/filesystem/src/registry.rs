//! Registry of open filesystems, keyed by endpoint and credential identity.
//!
//! Each identity key is either unused or held by exactly one open
//! filesystem. Closing a filesystem frees its key, after which a new
//! filesystem may be opened under it.

use std::sync::{Arc, Weak};

use bucketfs_storage::ObjectStoreClient;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::attribute_cache::{AttributeCache, SharedAttributeCache};
use crate::config::{self, Credentials, FileSystemOptions, FileSystemProperties, PropertySources};
use crate::error::FileSystemError;
use crate::filesystem::{FileSystemParts, ObjectFileSystem};
use crate::path::ObjectPath;
use crate::uri::{redact_identity, FileSystemUri, SCHEME};

/// Creates store clients for newly opened filesystems.
pub trait StorageClientFactory: Send + Sync {
    /// Create a client.
    ///
    /// # Arguments
    /// * `endpoint` - Store host
    /// * `credentials` - `None` for anonymous access
    /// * `properties` - Resolved properties
    fn create_client(
        &self,
        endpoint: &str,
        credentials: Option<&Credentials>,
        properties: &FileSystemProperties,
    ) -> Result<Arc<dyn ObjectStoreClient>, FileSystemError>;
}

impl<F> StorageClientFactory for F
where
    F: Fn(
            &str,
            Option<&Credentials>,
            &FileSystemProperties,
        ) -> Result<Arc<dyn ObjectStoreClient>, FileSystemError>
        + Send
        + Sync,
{
    fn create_client(
        &self,
        endpoint: &str,
        credentials: Option<&Credentials>,
        properties: &FileSystemProperties,
    ) -> Result<Arc<dyn ObjectStoreClient>, FileSystemError> {
        self(endpoint, credentials, properties)
    }
}

/// Opens, finds and closes filesystems.
///
/// Owns the shared attribute cache policy and the property sources used by
/// every filesystem it opens.
pub struct FileSystemProvider {
    file_systems: DashMap<String, Arc<ObjectFileSystem>>,
    attribute_cache: SharedAttributeCache,
    sources: PropertySources,
    factory: Arc<dyn StorageClientFactory>,
    self_ref: Weak<FileSystemProvider>,
}

struct Prepared {
    uri: FileSystemUri,
    properties: FileSystemProperties,
    key: String,
}

impl FileSystemProvider {
    /// Create a provider reading the process environment.
    ///
    /// # Arguments
    /// * `factory` - Creates a store client per filesystem
    pub fn new(factory: Arc<dyn StorageClientFactory>) -> Arc<Self> {
        Self::with_sources(factory, PropertySources::new())
    }

    /// Create a provider with explicit property sources.
    pub fn with_sources(factory: Arc<dyn StorageClientFactory>, sources: PropertySources) -> Arc<Self> {
        Arc::new_cyclic(|self_ref: &Weak<FileSystemProvider>| Self {
            file_systems: DashMap::new(),
            attribute_cache: SharedAttributeCache::default(),
            sources,
            factory,
            self_ref: self_ref.clone(),
        })
    }

    /// URI scheme served by this provider.
    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// Property sources, for setting system properties.
    pub fn property_sources(&self) -> &PropertySources {
        &self.sources
    }

    /// Current attribute cache policy.
    pub fn attribute_cache(&self) -> AttributeCache {
        self.attribute_cache.get()
    }

    /// Replace the attribute cache policy of every filesystem of this provider.
    pub fn set_attribute_cache(&self, cache: AttributeCache) {
        self.attribute_cache.replace(cache);
    }

    /// Open a new filesystem.
    ///
    /// # Arguments
    /// * `uri` - `s3://[access:secret@]host/...`
    /// * `properties` - Explicit properties, highest precedence
    ///
    /// # Errors
    /// `FileSystemAlreadyExists` if a filesystem is open for the identity.
    pub fn new_file_system(
        &self,
        uri: &str,
        properties: &FileSystemProperties,
    ) -> Result<Arc<ObjectFileSystem>, FileSystemError> {
        let prepared: Prepared = self.prepare(uri, properties)?;
        if self.file_systems.contains_key(&prepared.key) {
            return Err(already_exists(&prepared.key));
        }
        // The factory runs outside the entry lock; a filesystem registered
        // meanwhile wins and this one is dropped.
        let fs: Arc<ObjectFileSystem> = self.open(prepared)?;
        match self.file_systems.entry(fs.key().to_string()) {
            Entry::Occupied(occupied) => Err(already_exists(occupied.key())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&fs));
                log_opened(&fs);
                Ok(fs)
            }
        }
    }

    /// Find an open filesystem.
    ///
    /// # Errors
    /// `FileSystemNotFound` if none is open for the identity.
    pub fn get_file_system(
        &self,
        uri: &str,
        properties: &FileSystemProperties,
    ) -> Result<Arc<ObjectFileSystem>, FileSystemError> {
        let prepared: Prepared = self.prepare(uri, properties)?;
        self.file_systems
            .get(&prepared.key)
            .map(|fs| Arc::clone(fs.value()))
            .ok_or_else(|| FileSystemError::FileSystemNotFound {
                key: redact_identity(&prepared.key),
            })
    }

    /// Find an open filesystem, opening one if there is none.
    pub fn get_or_create_file_system(
        &self,
        uri: &str,
        properties: &FileSystemProperties,
    ) -> Result<Arc<ObjectFileSystem>, FileSystemError> {
        let prepared: Prepared = self.prepare(uri, properties)?;
        if let Some(open) = self.file_systems.get(&prepared.key) {
            return Ok(Arc::clone(open.value()));
        }
        let fs: Arc<ObjectFileSystem> = self.open(prepared)?;
        match self.file_systems.entry(fs.key().to_string()) {
            Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&fs));
                log_opened(&fs);
                Ok(fs)
            }
        }
    }

    /// Path addressed by a URI of an open filesystem.
    pub fn get_path(&self, uri: &str) -> Result<ObjectPath, FileSystemError> {
        let fs: Arc<ObjectFileSystem> = self.get_file_system(uri, &FileSystemProperties::new())?;
        let parsed: FileSystemUri = FileSystemUri::parse(uri)?;
        fs.get_path(parsed.path())
    }

    /// Remove a filesystem from the registry.
    ///
    /// Only the registered instance itself is removed; closing a stale
    /// handle leaves a re-opened filesystem under the same key in place.
    ///
    /// # Returns
    /// true if the instance was registered.
    pub fn close(&self, fs: &ObjectFileSystem) -> bool {
        let removed: bool = self
            .file_systems
            .remove_if(fs.key(), |_, open: &Arc<ObjectFileSystem>| {
                std::ptr::eq(Arc::as_ptr(open), fs)
            })
            .is_some();
        if removed {
            tracing::info!("Closed filesystem {}", redact_identity(fs.key()));
        }
        removed
    }

    /// Whether `fs` is the instance registered under its key.
    pub fn is_open(&self, fs: &ObjectFileSystem) -> bool {
        self.file_systems
            .get(fs.key())
            .map_or(false, |open| std::ptr::eq(Arc::as_ptr(open.value()), fs))
    }

    /// Number of open filesystems.
    pub fn open_count(&self) -> usize {
        self.file_systems.len()
    }

    fn prepare(
        &self,
        uri: &str,
        explicit: &FileSystemProperties,
    ) -> Result<Prepared, FileSystemError> {
        let uri: FileSystemUri = FileSystemUri::parse(uri)?;
        let mut properties: FileSystemProperties = self.sources.resolve(explicit)?;
        uri.apply_credentials(&mut properties);
        config::credentials(&properties)?;
        let key: String = uri.identity_key(&properties);
        Ok(Prepared {
            uri,
            properties,
            key,
        })
    }

    fn open(&self, prepared: Prepared) -> Result<Arc<ObjectFileSystem>, FileSystemError> {
        let Prepared {
            uri,
            properties,
            key,
        } = prepared;
        let endpoint: String = uri.endpoint(&properties);
        let credentials: Option<Credentials> = config::credentials(&properties)?;
        let options: FileSystemOptions = FileSystemOptions::from_properties(&properties)?;
        let client: Arc<dyn ObjectStoreClient> =
            self.factory
                .create_client(&endpoint, credentials.as_ref(), &properties)?;

        Ok(ObjectFileSystem::from_parts(FileSystemParts {
            key,
            endpoint,
            default_bucket: uri.bucket().map(str::to_string),
            client,
            attribute_cache: self.attribute_cache.clone(),
            options,
            properties,
            provider: self.self_ref.clone(),
        }))
    }
}

fn already_exists(key: &str) -> FileSystemError {
    FileSystemError::FileSystemAlreadyExists {
        key: redact_identity(key),
    }
}

fn log_opened(fs: &ObjectFileSystem) {
    tracing::info!(
        "Opened filesystem {} at {}",
        redact_identity(fs.key()),
        fs.endpoint()
    );
}
