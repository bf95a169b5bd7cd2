//! File attributes derived from object metadata and ACLs.
//!
//! Two views are exposed: `basic` (size, timestamps, kind) and `posix`
//! (basic plus owner and permission bits). Objects cannot change their
//! timestamps, so explicitly set times live in user metadata under the
//! `bucketfs-*` keys and take precedence over the store's own time.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bucketfs_storage::{AccessControlList, Grantee, ObjectMetadata, ObjectSummary, Permission};

use crate::error::FileSystemError;
use crate::resolver::EntryTags;

/// User metadata key holding the explicit last-modified time (epoch millis).
pub const LAST_MODIFIED_METADATA: &str = "bucketfs-last-modified";
/// User metadata key holding the explicit last-access time (epoch millis).
pub const LAST_ACCESS_METADATA: &str = "bucketfs-last-access";
/// User metadata key holding the explicit creation time (epoch millis).
pub const CREATE_TIME_METADATA: &str = "bucketfs-create-time";

/// Attribute view names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeView {
    /// Size, timestamps and kind.
    Basic,
    /// Basic plus owner, group and permissions.
    Posix,
}

impl AttributeView {
    /// View name as used in attribute queries.
    pub fn name(&self) -> &'static str {
        match self {
            AttributeView::Basic => "basic",
            AttributeView::Posix => "posix",
        }
    }

    /// Look up a view by name.
    ///
    /// # Errors
    /// `Unsupported` for any name other than `basic` or `posix`.
    pub fn from_name(name: &str) -> Result<Self, FileSystemError> {
        match name {
            "basic" => Ok(AttributeView::Basic),
            "posix" => Ok(AttributeView::Posix),
            other => Err(FileSystemError::unsupported(format!(
                "attribute view {other:?}; only basic and posix are supported"
            ))),
        }
    }
}

/// Basic attributes of a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicFileAttributes {
    /// Identifies the object, `bucket/key`.
    pub file_key: String,
    /// Size in bytes; zero for directories without a stored object.
    pub size: u64,
    /// Last modification time.
    pub last_modified_time: Option<SystemTime>,
    /// Last access time. Stores do not track access, so this defaults to the
    /// modification time.
    pub last_access_time: Option<SystemTime>,
    /// Creation time, defaulting to the modification time.
    pub creation_time: Option<SystemTime>,
    /// A directory marker, the bucket root or an implicit directory.
    pub is_directory: bool,
    /// An object is stored at the exact key.
    pub is_regular_file: bool,
}

impl BasicFileAttributes {
    /// Attributes of a plain file.
    ///
    /// # Arguments
    /// * `file_key` - Object identifier
    /// * `size` - Size in bytes
    /// * `last_modified` - Modification time
    pub fn regular_file(
        file_key: impl Into<String>,
        size: u64,
        last_modified: Option<SystemTime>,
    ) -> Self {
        Self {
            file_key: file_key.into(),
            size,
            last_modified_time: last_modified,
            last_access_time: last_modified,
            creation_time: last_modified,
            is_directory: false,
            is_regular_file: true,
        }
    }

    /// Attributes of a directory with no stored content.
    pub fn directory(file_key: impl Into<String>) -> Self {
        Self {
            file_key: file_key.into(),
            size: 0,
            last_modified_time: None,
            last_access_time: None,
            creation_time: None,
            is_directory: true,
            is_regular_file: false,
        }
    }

    /// Attributes from a listing summary.
    ///
    /// # Arguments
    /// * `summary` - Listed object
    /// * `tags` - Classification of the path
    pub fn from_summary(summary: &ObjectSummary, tags: EntryTags) -> Self {
        Self {
            file_key: format!("{}/{}", summary.bucket, summary.key),
            size: summary.size,
            last_modified_time: summary.last_modified,
            last_access_time: summary.last_modified,
            creation_time: summary.last_modified,
            is_directory: tags.is_directory(),
            is_regular_file: tags.is_file(),
        }
    }

    /// Attributes from a metadata lookup, honouring explicitly set times.
    ///
    /// # Arguments
    /// * `file_key` - Object identifier
    /// * `metadata` - Object metadata
    /// * `tags` - Classification of the path
    pub fn from_metadata(
        file_key: impl Into<String>,
        metadata: &ObjectMetadata,
        tags: EntryTags,
    ) -> Self {
        let last_modified: Option<SystemTime> =
            metadata_time(metadata, LAST_MODIFIED_METADATA).or(metadata.last_modified);
        Self {
            file_key: file_key.into(),
            size: metadata.content_length,
            last_modified_time: last_modified,
            last_access_time: metadata_time(metadata, LAST_ACCESS_METADATA).or(last_modified),
            creation_time: metadata_time(metadata, CREATE_TIME_METADATA).or(last_modified),
            is_directory: tags.is_directory(),
            is_regular_file: tags.is_file(),
        }
    }

    /// Always false; stores have no links.
    pub fn is_symbolic_link(&self) -> bool {
        false
    }

    /// Always false.
    pub fn is_other(&self) -> bool {
        false
    }
}

/// Permission bits in the usual `rwxrwxrwx` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PosixPermissions(u16);

impl PosixPermissions {
    pub const OWNER_READ: u16 = 0o400;
    pub const OWNER_WRITE: u16 = 0o200;
    pub const OWNER_EXECUTE: u16 = 0o100;
    pub const GROUP_READ: u16 = 0o040;
    pub const GROUP_WRITE: u16 = 0o020;
    pub const GROUP_EXECUTE: u16 = 0o010;
    pub const OTHERS_READ: u16 = 0o004;
    pub const OTHERS_WRITE: u16 = 0o002;
    pub const OTHERS_EXECUTE: u16 = 0o001;

    /// Permissions from raw mode bits.
    pub fn from_mode(mode: u16) -> Self {
        Self(mode & 0o777)
    }

    /// Raw mode bits.
    pub fn mode(&self) -> u16 {
        self.0
    }

    /// Whether every bit in `bits` is set.
    pub fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    /// Translate an ACL into permission bits.
    ///
    /// Grants to `owner_id` become owner bits, grants to authenticated users
    /// become group bits and grants to everyone become others bits. Execute
    /// is never granted.
    ///
    /// # Arguments
    /// * `acl` - Object ACL
    /// * `owner_id` - Canonical id of the bucket owner
    pub fn from_acl(acl: &AccessControlList, owner_id: Option<&str>) -> Self {
        let mut mode: u16 = 0;
        for grant in &acl.grants {
            let (read, write): (u16, u16) = match &grant.grantee {
                Grantee::Canonical(owner) if Some(owner.id.as_str()) == owner_id => {
                    (Self::OWNER_READ, Self::OWNER_WRITE)
                }
                Grantee::AuthenticatedUsers => (Self::GROUP_READ, Self::GROUP_WRITE),
                Grantee::AllUsers => (Self::OTHERS_READ, Self::OTHERS_WRITE),
                _ => continue,
            };
            mode |= match grant.permission {
                Permission::Read => read,
                Permission::Write => write,
                Permission::FullControl => read | write,
                Permission::ReadAcp | Permission::WriteAcp => 0,
            };
        }
        Self(mode)
    }
}

impl fmt::Display for PosixPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SYMBOLS: [char; 3] = ['r', 'w', 'x'];
        for shift in (0..9).rev() {
            let symbol: char = SYMBOLS[(8 - shift) % 3];
            if self.0 & (1 << shift) != 0 {
                write!(f, "{}", symbol)?;
            } else {
                write!(f, "-")?;
            }
        }
        Ok(())
    }
}

/// Posix-like attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixFileAttributes {
    /// The basic attributes.
    pub basic: BasicFileAttributes,
    /// Owner name, from the bucket owner.
    pub owner: Option<String>,
    /// Stores have no groups; always `None`.
    pub group: Option<String>,
    /// Permission bits from the object ACL.
    pub permissions: PosixPermissions,
}

/// Attributes of one of the supported views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAttributes {
    /// Basic view.
    Basic(BasicFileAttributes),
    /// Posix view.
    Posix(PosixFileAttributes),
}

impl FileAttributes {
    /// The view these attributes belong to.
    pub fn view(&self) -> AttributeView {
        match self {
            FileAttributes::Basic(_) => AttributeView::Basic,
            FileAttributes::Posix(_) => AttributeView::Posix,
        }
    }

    /// The basic part.
    pub fn basic(&self) -> &BasicFileAttributes {
        match self {
            FileAttributes::Basic(basic) => basic,
            FileAttributes::Posix(posix) => &posix.basic,
        }
    }
}

/// An attributes snapshot and the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAttributes {
    attributes: FileAttributes,
    fetched_at: SystemTime,
}

impl CachedAttributes {
    /// Create a snapshot.
    pub fn new(attributes: FileAttributes, fetched_at: SystemTime) -> Self {
        Self {
            attributes,
            fetched_at,
        }
    }

    /// Create a snapshot fetched now.
    pub fn fetched_now(attributes: FileAttributes) -> Self {
        Self::new(attributes, SystemTime::now())
    }

    /// The attributes.
    pub fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    /// Consume the snapshot.
    pub fn into_attributes(self) -> FileAttributes {
        self.attributes
    }

    /// When the snapshot was fetched.
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// The view of the attributes.
    pub fn view(&self) -> AttributeView {
        self.attributes.view()
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(bool),
    Size(u64),
    Time(Option<SystemTime>),
    Text(Option<String>),
    Permissions(PosixPermissions),
}

/// A parsed attribute query such as `"*"`, `"posix:*"` or `"basic:size,lastModifiedTime"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeQuery {
    /// View to read.
    pub view: AttributeView,
    /// Requested names; `None` selects every attribute of the view.
    pub names: Option<Vec<String>>,
}

impl AttributeQuery {
    /// Parse a query.
    ///
    /// # Errors
    /// `Unsupported` if the query names a view other than `basic` or `posix`.
    pub fn parse(query: &str) -> Result<Self, FileSystemError> {
        let query: &str = query.trim();
        if query.is_empty() {
            return Err(FileSystemError::unsupported("empty attribute query"));
        }
        let (view, rest): (AttributeView, &str) = match query.split_once(':') {
            Some((view, rest)) => (AttributeView::from_name(view)?, rest),
            None => (AttributeView::Basic, query),
        };
        if rest == "*" {
            return Ok(Self { view, names: None });
        }
        let prefix: String = format!("{}:", view.name());
        let names: Vec<String> = rest
            .split(',')
            .map(|n: &str| n.trim())
            .map(|n: &str| n.strip_prefix(prefix.as_str()).unwrap_or(n))
            .filter(|n: &&str| !n.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            view,
            names: Some(names),
        })
    }

    /// Project attributes onto the requested names.
    ///
    /// Unknown names are skipped.
    pub fn select(&self, attributes: &FileAttributes) -> BTreeMap<String, AttributeValue> {
        let all: BTreeMap<String, AttributeValue> = attribute_map(attributes);
        match &self.names {
            None => all,
            Some(names) => all
                .into_iter()
                .filter(|(name, _)| names.iter().any(|n: &String| n == name))
                .collect(),
        }
    }
}

/// Every attribute of `attributes` by name.
pub fn attribute_map(attributes: &FileAttributes) -> BTreeMap<String, AttributeValue> {
    let basic: &BasicFileAttributes = attributes.basic();
    let mut map: BTreeMap<String, AttributeValue> = BTreeMap::new();
    map.insert(
        "lastModifiedTime".into(),
        AttributeValue::Time(basic.last_modified_time),
    );
    map.insert(
        "lastAccessTime".into(),
        AttributeValue::Time(basic.last_access_time),
    );
    map.insert("creationTime".into(), AttributeValue::Time(basic.creation_time));
    map.insert("size".into(), AttributeValue::Size(basic.size));
    map.insert(
        "isRegularFile".into(),
        AttributeValue::Bool(basic.is_regular_file),
    );
    map.insert("isDirectory".into(), AttributeValue::Bool(basic.is_directory));
    map.insert(
        "isSymbolicLink".into(),
        AttributeValue::Bool(basic.is_symbolic_link()),
    );
    map.insert("isOther".into(), AttributeValue::Bool(basic.is_other()));
    map.insert(
        "fileKey".into(),
        AttributeValue::Text(Some(basic.file_key.clone())),
    );
    if let FileAttributes::Posix(posix) = attributes {
        map.insert("owner".into(), AttributeValue::Text(posix.owner.clone()));
        map.insert("group".into(), AttributeValue::Text(posix.group.clone()));
        map.insert(
            "permissions".into(),
            AttributeValue::Permissions(posix.permissions),
        );
    }
    map
}

/// Store explicit timestamps in user metadata.
///
/// `None` arguments leave the existing entries untouched.
pub fn apply_times(
    metadata: &mut ObjectMetadata,
    last_modified: Option<SystemTime>,
    last_access: Option<SystemTime>,
    creation: Option<SystemTime>,
) {
    for (key, time) in [
        (LAST_MODIFIED_METADATA, last_modified),
        (LAST_ACCESS_METADATA, last_access),
        (CREATE_TIME_METADATA, creation),
    ] {
        if let Some(time) = time {
            metadata
                .user_metadata
                .insert(key.to_string(), to_epoch_millis(time).to_string());
        }
    }
}

fn metadata_time(metadata: &ObjectMetadata, key: &str) -> Option<SystemTime> {
    metadata
        .user_metadata
        .get(key)
        .and_then(|v: &String| v.parse::<i64>().ok())
        .map(from_epoch_millis)
}

fn to_epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

fn from_epoch_millis(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs_storage::{Grant, Owner};

    #[test]
    fn test_query_parsing() {
        assert_eq!(
            AttributeQuery::parse("*").unwrap(),
            AttributeQuery {
                view: AttributeView::Basic,
                names: None
            }
        );
        assert_eq!(
            AttributeQuery::parse("posix:*").unwrap().view,
            AttributeView::Posix
        );
        assert_eq!(
            AttributeQuery::parse("basic:size,lastModifiedTime")
                .unwrap()
                .names,
            Some(vec!["size".to_string(), "lastModifiedTime".to_string()])
        );
        assert_eq!(
            AttributeQuery::parse("posix:owner,posix:permissions")
                .unwrap()
                .names,
            Some(vec!["owner".to_string(), "permissions".to_string()])
        );
        assert!(matches!(
            AttributeQuery::parse("dos:hidden"),
            Err(FileSystemError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_select_subset_skips_unknown_names() {
        let attrs: FileAttributes =
            FileAttributes::Basic(BasicFileAttributes::regular_file("b/k", 42, None));
        let query: AttributeQuery = AttributeQuery::parse("size,isDirectory,bogus").unwrap();

        let map: BTreeMap<String, AttributeValue> = query.select(&attrs);

        assert_eq!(map.len(), 2);
        assert_eq!(map["size"], AttributeValue::Size(42));
        assert_eq!(map["isDirectory"], AttributeValue::Bool(false));
    }

    #[test]
    fn test_permissions_from_acl() {
        let owner: Owner = Owner::new("owner-id");
        let mut acl: AccessControlList = AccessControlList::private(owner);
        acl.grants.push(Grant::new(Grantee::AllUsers, Permission::Read));
        acl.grants.push(Grant::new(
            Grantee::AuthenticatedUsers,
            Permission::ReadAcp,
        ));

        let perms: PosixPermissions = PosixPermissions::from_acl(&acl, Some("owner-id"));

        assert_eq!(perms.mode(), 0o604);
        assert_eq!(perms.to_string(), "rw----r--");
        assert!(perms.contains(PosixPermissions::OWNER_READ | PosixPermissions::OWNER_WRITE));
        assert_eq!(PosixPermissions::from_acl(&acl, None).mode(), 0o004);
    }

    #[test]
    fn test_explicit_times_override_store_time() {
        let stored: SystemTime = UNIX_EPOCH + Duration::from_secs(1_000);
        let explicit: SystemTime = UNIX_EPOCH + Duration::from_millis(5_000_123);
        let mut metadata: ObjectMetadata = ObjectMetadata {
            content_length: 7,
            last_modified: Some(stored),
            ..Default::default()
        };
        apply_times(&mut metadata, Some(explicit), None, None);

        let attrs: BasicFileAttributes =
            BasicFileAttributes::from_metadata("b/k", &metadata, EntryTags::FILE);

        assert_eq!(attrs.last_modified_time, Some(explicit));
        assert_eq!(attrs.last_access_time, Some(explicit));
        assert_eq!(attrs.size, 7);
        assert!(attrs.is_regular_file);
        assert!(!attrs.is_directory);
    }

    #[test]
    fn test_epoch_millis_before_epoch() {
        let before: SystemTime = UNIX_EPOCH - Duration::from_millis(1500);
        assert_eq!(to_epoch_millis(before), -1500);
        assert_eq!(from_epoch_millis(-1500), before);
    }
}
