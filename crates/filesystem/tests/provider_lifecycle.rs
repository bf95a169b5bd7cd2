//! Attribute snapshots, property precedence and the filesystem registry.

mod common;

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bucketfs_filesystem::{
    AccessMode, AttributeCache, AttributeValue, AttributeView, BucketHandle, FileAttributes,
    FileSystemError, FileSystemProperties, ObjectFileSystem, ObjectPath, PosixPermissions,
    PropertySources,
};
use bucketfs_storage::{AccessControlList, Owner, StoreOperation};
use common::{harness, harness_with, harness_with_env, Harness, BUCKET};
use futures::TryStreamExt;
use tempfile::NamedTempFile;

async fn listed_child(fs: &ObjectFileSystem, dir: &str) -> ObjectPath {
    let dir: ObjectPath = fs.get_path(dir).unwrap();
    let mut children: Vec<ObjectPath> = fs
        .new_directory_stream(&dir)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    children.remove(0)
}

#[tokio::test]
async fn test_listed_snapshot_is_used_once() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "dir/file", "12345");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let mut child: ObjectPath = listed_child(&fs, "/bucket/dir").await;
    h.store.counters().reset();

    let first: FileAttributes = fs
        .read_attributes(&mut child, AttributeView::Basic)
        .await
        .unwrap();
    assert_eq!(first.basic().size, 5);
    assert!(first.basic().is_regular_file);
    assert_eq!(h.store.counters().total(), 0);
    assert!(child.attributes().is_none());

    // The snapshot was consumed, so the next read goes to the store.
    fs.read_attributes(&mut child, AttributeView::Basic)
        .await
        .unwrap();
    assert!(h.store.counters().get(StoreOperation::GetObjectMetadata) > 0);
    assert!(child.attributes().is_some());
}

#[tokio::test]
async fn test_stale_snapshot_is_refetched() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "dir/file", "12345");
    h.provider.set_attribute_cache(AttributeCache::new(Duration::ZERO));
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let mut child: ObjectPath = listed_child(&fs, "/bucket/dir").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.store.counters().reset();

    fs.read_attributes(&mut child, AttributeView::Basic)
        .await
        .unwrap();

    assert!(h.store.counters().get(StoreOperation::GetObjectMetadata) > 0);
}

#[tokio::test]
async fn test_disabled_cache_always_fetches() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "dir/file", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());
    h.provider.set_attribute_cache(AttributeCache::disabled());

    let mut child: ObjectPath = listed_child(&fs, "/bucket/dir").await;
    h.store.counters().reset();
    fs.read_attributes(&mut child, AttributeView::Basic)
        .await
        .unwrap();

    assert!(h.store.counters().get(StoreOperation::GetObjectMetadata) > 0);
}

#[tokio::test]
async fn test_posix_attributes_follow_acl() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "owned", "x");
    h.store.insert_object(BUCKET, "foreign", "x");
    let stranger: Owner = Owner::new("someone-else");
    h.store
        .set_object_acl(BUCKET, "foreign", AccessControlList::private(stranger));
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let mut owned: ObjectPath = fs.get_path("/bucket/owned").unwrap();
    let mut foreign: ObjectPath = fs.get_path("/bucket/foreign").unwrap();

    let attrs: FileAttributes = fs
        .read_attributes(&mut owned, AttributeView::Posix)
        .await
        .unwrap();
    let FileAttributes::Posix(posix) = attrs else {
        panic!("expected posix attributes");
    };
    assert!(posix.permissions.contains(PosixPermissions::OWNER_READ));
    assert!(posix.permissions.contains(PosixPermissions::OWNER_WRITE));
    assert!(!posix.permissions.contains(PosixPermissions::OWNER_EXECUTE));
    assert_eq!(posix.owner.as_deref(), Some("memory"));

    fs.check_access(&owned, &[AccessMode::Read, AccessMode::Write])
        .await
        .unwrap();
    assert!(matches!(
        fs.check_access(&foreign, &[AccessMode::Read]).await,
        Err(FileSystemError::AccessDenied { .. })
    ));
    assert!(matches!(
        fs.check_access(&owned, &[AccessMode::Execute]).await,
        Err(FileSystemError::AccessDenied { .. })
    ));

    let map: BTreeMap<String, AttributeValue> = fs
        .read_attributes_map(&mut foreign, "size,isDirectory")
        .await
        .unwrap();
    assert_eq!(map.get("size"), Some(&AttributeValue::Size(1)));
    assert_eq!(map.get("isDirectory"), Some(&AttributeValue::Bool(false)));
}

#[tokio::test]
async fn test_property_precedence() {
    let mut defaults: NamedTempFile = NamedTempFile::new().unwrap();
    writeln!(defaults, "list_page_size = 7").unwrap();
    writeln!(defaults, "copy_part_size = 1000").unwrap();
    writeln!(defaults, "user_agent = \"from-file\"").unwrap();

    let env: HashMap<String, String> =
        [("BUCKETFS_COPY_PART_SIZE".to_string(), "2000".to_string())]
            .into_iter()
            .collect();
    let h: Harness = harness_with_env(
        PropertySources::new()
            .with_defaults_file(defaults.path())
            .with_system_property("user_agent", "from-system"),
        env,
    );

    let explicit: FileSystemProperties =
        [("list_page_size".to_string(), "3".to_string())].into_iter().collect();
    let fs: Arc<ObjectFileSystem> = h.open(&explicit);

    assert_eq!(fs.options().list_page_size, 3);
    assert_eq!(fs.options().copy_part_size, 2000);
    assert_eq!(fs.properties()["user_agent"], "from-system");
}

#[tokio::test]
async fn test_malformed_defaults_file_fails_open() {
    let mut defaults: NamedTempFile = NamedTempFile::new().unwrap();
    writeln!(defaults, "this is = = not toml").unwrap();
    let h: Harness = harness_with(PropertySources::new().with_defaults_file(defaults.path()));

    let err: FileSystemError = h
        .provider
        .new_file_system("s3://host/", &FileSystemProperties::new())
        .unwrap_err();

    assert!(matches!(err, FileSystemError::DefaultsFile { .. }));
    assert_eq!(h.provider.open_count(), 0);
}

#[tokio::test]
async fn test_invalid_option_value_fails_open() {
    let h: Harness = harness();
    let props: FileSystemProperties =
        [("copy_part_size".to_string(), "0".to_string())].into_iter().collect();

    assert!(matches!(
        h.provider.new_file_system("s3://host/", &props),
        Err(FileSystemError::InvalidConfig { .. })
    ));
}

#[tokio::test]
async fn test_credentials_select_distinct_filesystems() {
    let h: Harness = harness();
    let none: FileSystemProperties = FileSystemProperties::new();

    let anonymous: Arc<ObjectFileSystem> =
        h.provider.new_file_system("s3://host/", &none).unwrap();
    let with_keys: Arc<ObjectFileSystem> = h
        .provider
        .new_file_system("s3://ak:s%2Fk@host/", &none)
        .unwrap();

    assert_eq!(anonymous.key(), "host");
    assert_eq!(with_keys.key(), "ak:s%2Fk@host");
    assert_eq!(with_keys.properties()["secret_key"], "s/k");
    assert_eq!(h.provider.open_count(), 2);

    assert!(with_keys.close());
    assert_eq!(h.provider.open_count(), 1);
    assert!(anonymous.is_open());
}

#[tokio::test]
async fn test_bucket_handle_reports_owner() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "x", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let path: ObjectPath = fs.get_path("/bucket/x").unwrap();
    let handle: BucketHandle = fs.bucket(&path).await.unwrap();

    assert!(handle.exists());
    assert_eq!(handle.name(), BUCKET);
    assert_eq!(handle.owner().map(|o: &Owner| o.id.as_str()), Some("memory-owner"));
    assert!(handle
        .file_system()
        .map_or(false, |owner: Arc<ObjectFileSystem>| Arc::ptr_eq(&owner, &fs)));
}
