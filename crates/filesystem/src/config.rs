//! Filesystem properties and options.
//!
//! Properties are plain string pairs. For the names in
//! [`OVERRIDABLE_PROPERTIES`] a value is taken from the first source that has
//! one, highest first:
//!
//! 1. the map passed when opening a filesystem
//! 2. system properties held by the provider
//! 3. the process environment, as `BUCKETFS_<NAME>`
//! 4. the TOML defaults file
//!
//! Any other name passes through from the explicit map or the defaults file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::FileSystemError;
use crate::transfer::DEFAULT_COPY_PART_SIZE;

/// Resolved properties of a filesystem.
pub type FileSystemProperties = HashMap<String, String>;

/// Property names.
pub mod properties {
    pub const ACCESS_KEY: &str = "access_key";
    pub const SECRET_KEY: &str = "secret_key";
    pub const ENDPOINT: &str = "endpoint";
    pub const REGION: &str = "region";
    pub const PATH_STYLE_ACCESS: &str = "path_style_access";
    pub const COPY_PART_SIZE: &str = "copy_part_size";
    pub const LIST_PAGE_SIZE: &str = "list_page_size";
    pub const MAX_CONNECTIONS: &str = "max_connections";
    pub const CONNECTION_TIMEOUT_MS: &str = "connection_timeout_ms";
    pub const SOCKET_TIMEOUT_MS: &str = "socket_timeout_ms";
    pub const MAX_ERROR_RETRY: &str = "max_error_retry";
    pub const USER_AGENT: &str = "user_agent";
}

/// Properties that system properties and the environment may supply.
pub const OVERRIDABLE_PROPERTIES: &[&str] = &[
    properties::ACCESS_KEY,
    properties::SECRET_KEY,
    properties::ENDPOINT,
    properties::REGION,
    properties::PATH_STYLE_ACCESS,
    properties::COPY_PART_SIZE,
    properties::LIST_PAGE_SIZE,
    properties::MAX_CONNECTIONS,
    properties::CONNECTION_TIMEOUT_MS,
    properties::SOCKET_TIMEOUT_MS,
    properties::MAX_ERROR_RETRY,
    properties::USER_AGENT,
];

/// Prefix of environment variables carrying properties.
pub const ENV_PREFIX: &str = "BUCKETFS_";

/// Default number of entries per list request.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Environment variable name for a property.
pub fn env_var_name(property: &str) -> String {
    format!("{}{}", ENV_PREFIX, property.to_uppercase())
}

/// Read access to environment variables.
pub trait EnvironmentSource: Send + Sync {
    /// Value of the variable `name`, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentSource for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvironmentSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct DefaultsFile {
    values: HashMap<String, toml::Value>,
}

/// Where property values come from, besides the explicit map.
pub struct PropertySources {
    system: RwLock<HashMap<String, String>>,
    environment: Arc<dyn EnvironmentSource>,
    defaults_file: Option<PathBuf>,
}

impl Default for PropertySources {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PropertySources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySources")
            .field("system", &self.system.read().keys().collect::<Vec<_>>())
            .field("defaults_file", &self.defaults_file)
            .finish()
    }
}

impl PropertySources {
    /// Read the process environment; no system properties or defaults file.
    pub fn new() -> Self {
        Self {
            system: RwLock::new(HashMap::new()),
            environment: Arc::new(ProcessEnvironment),
            defaults_file: None,
        }
    }

    /// Use another environment source.
    ///
    /// # Arguments
    /// * `environment` - Source of `BUCKETFS_*` variables
    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentSource>) -> Self {
        self.environment = environment;
        self
    }

    /// Load defaults from a TOML file. A missing file supplies nothing.
    ///
    /// # Arguments
    /// * `path` - Location of the defaults file
    pub fn with_defaults_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.defaults_file = Some(path.into());
        self
    }

    /// Set a system property.
    pub fn with_system_property(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_system_property(name, value);
        self
    }

    /// Set a system property in place.
    pub fn set_system_property(&self, name: impl Into<String>, value: impl Into<String>) {
        self.system.write().insert(name.into(), value.into());
    }

    /// Remove a system property.
    pub fn clear_system_property(&self, name: &str) {
        self.system.write().remove(name);
    }

    /// Resolve the properties for one filesystem.
    ///
    /// # Arguments
    /// * `explicit` - Properties passed by the caller
    ///
    /// # Errors
    /// `DefaultsFile` if the defaults file cannot be read or parsed.
    pub fn resolve(
        &self,
        explicit: &FileSystemProperties,
    ) -> Result<FileSystemProperties, FileSystemError> {
        let mut resolved: FileSystemProperties = match &self.defaults_file {
            Some(path) => load_defaults_file(path)?,
            None => FileSystemProperties::new(),
        };
        resolved.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));

        let system = self.system.read();
        for name in OVERRIDABLE_PROPERTIES {
            if explicit.contains_key(*name) {
                continue;
            }
            let overridden: Option<String> = system
                .get(*name)
                .cloned()
                .or_else(|| self.environment.var(&env_var_name(name)));
            if let Some(value) = overridden {
                resolved.insert(name.to_string(), value);
            }
        }
        Ok(resolved)
    }
}

/// Load a flat TOML table of property values.
///
/// # Returns
/// An empty map if the file does not exist.
pub fn load_defaults_file(path: &Path) -> Result<FileSystemProperties, FileSystemError> {
    let text: String = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No defaults file at {}", path.display());
            return Ok(FileSystemProperties::new());
        }
        Err(e) => {
            return Err(FileSystemError::DefaultsFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    let parsed: DefaultsFile =
        toml::from_str(&text).map_err(|e: toml::de::Error| FileSystemError::DefaultsFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(parsed
        .values
        .into_iter()
        .map(|(name, value)| {
            let text: String = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, text)
        })
        .collect())
}

/// Access key and secret of a filesystem.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Credentials from resolved properties.
///
/// # Returns
/// `None` for anonymous access.
///
/// # Errors
/// `InvalidConfig` if only one of access key and secret key is set.
pub fn credentials(props: &FileSystemProperties) -> Result<Option<Credentials>, FileSystemError> {
    match (
        props.get(properties::ACCESS_KEY),
        props.get(properties::SECRET_KEY),
    ) {
        (Some(access_key), Some(secret_key)) => Ok(Some(Credentials {
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
        })),
        (None, None) => Ok(None),
        _ => Err(FileSystemError::InvalidConfig {
            message: format!(
                "{} and {} must be set together",
                properties::ACCESS_KEY,
                properties::SECRET_KEY
            ),
        }),
    }
}

/// Tunables of a filesystem instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemOptions {
    /// Part size of parallel copies.
    pub copy_part_size: u64,
    /// Entries requested per list call.
    pub list_page_size: usize,
}

impl Default for FileSystemOptions {
    fn default() -> Self {
        Self {
            copy_part_size: DEFAULT_COPY_PART_SIZE,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

impl FileSystemOptions {
    /// Set the part size of parallel copies.
    ///
    /// # Arguments
    /// * `size` - Bytes per part
    pub fn with_copy_part_size(mut self, size: u64) -> Self {
        self.copy_part_size = size;
        self
    }

    /// Set the list page size.
    ///
    /// # Arguments
    /// * `size` - Entries per list request
    pub fn with_list_page_size(mut self, size: usize) -> Self {
        self.list_page_size = size;
        self
    }

    /// Options from resolved properties; absent entries keep their defaults.
    ///
    /// # Errors
    /// `InvalidConfig` for values that are not positive integers.
    pub fn from_properties(props: &FileSystemProperties) -> Result<Self, FileSystemError> {
        let mut options: FileSystemOptions = FileSystemOptions::default();
        if let Some(size) = positive(props, properties::COPY_PART_SIZE)? {
            options.copy_part_size = size;
        }
        if let Some(size) = positive(props, properties::LIST_PAGE_SIZE)? {
            options.list_page_size = size as usize;
        }
        Ok(options)
    }
}

fn positive(props: &FileSystemProperties, name: &str) -> Result<Option<u64>, FileSystemError> {
    let Some(text) = props.get(name) else {
        return Ok(None);
    };
    match text.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(FileSystemError::InvalidConfig {
            message: format!("{name} must be a positive integer, got {text:?}"),
        }),
    }
}
