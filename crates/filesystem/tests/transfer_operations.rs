//! Copy, move and delete, checked by the requests they issue.

mod common;

use std::sync::Arc;

use bucketfs_filesystem::{
    AttributeView, CopyOption, FileAttributes, FileSystemError, FileSystemProperties, ObjectFileSystem, ObjectPath,
    PARALLEL_SIZE_THRESHOLD,
};
use bucketfs_storage::{RequestCounters, StorageError, StoreOperation};
use common::{harness, Harness, BUCKET};

const PART_SIZE: u64 = 8 * 1024 * 1024;

fn small_parts() -> FileSystemProperties {
    [("copy_part_size".to_string(), PART_SIZE.to_string())]
        .into_iter()
        .collect()
}

fn large_body() -> Vec<u8> {
    (0..PARALLEL_SIZE_THRESHOLD + 1)
        .map(|i: u64| (i % 251) as u8)
        .collect()
}

#[tokio::test]
async fn test_small_copy_is_one_request() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "src", "payload");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let source: ObjectPath = fs.get_path("/bucket/src").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/dst").unwrap();
    fs.copy(&source, &target, &[]).await.unwrap();

    assert_eq!(h.store.counters().get(StoreOperation::CopyObject), 1);
    assert_eq!(h.store.counters().get(StoreOperation::CreateMultipartUpload), 0);
    assert_eq!(h.store.object_data(BUCKET, "dst").unwrap(), b"payload");
    assert_eq!(h.store.object_data(BUCKET, "src").unwrap(), b"payload");
}

#[tokio::test]
async fn test_large_copy_uses_multipart_parts() {
    let h: Harness = harness();
    let body: Vec<u8> = large_body();
    h.store.insert_object(BUCKET, "big", body.clone());
    let fs: Arc<ObjectFileSystem> = h.open(&small_parts());

    let source: ObjectPath = fs.get_path("/bucket/big").unwrap();
    let target: ObjectPath = fs.get_path("/other/big-copy").unwrap();
    h.store.insert_object("other", "unrelated", "x");
    fs.copy(&source, &target, &[]).await.unwrap();

    let counters: &RequestCounters = h.store.counters();
    assert_eq!(counters.get(StoreOperation::CopyObject), 0);
    assert_eq!(counters.get(StoreOperation::CreateMultipartUpload), 1);
    assert_eq!(counters.get(StoreOperation::UploadPartCopy), 3);
    assert_eq!(counters.get(StoreOperation::CompleteMultipartUpload), 1);
    assert_eq!(h.store.pending_uploads(), 0);
    assert_eq!(h.store.object_data("other", "big-copy").unwrap(), body);
}

#[tokio::test]
async fn test_failed_part_aborts_upload() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "big", large_body());
    h.store.fail_on(
        StoreOperation::UploadPartCopy,
        StorageError::Service {
            status: 500,
            message: "injected".to_string(),
        },
    );
    let fs: Arc<ObjectFileSystem> = h.open(&small_parts());

    let source: ObjectPath = fs.get_path("/bucket/big").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/big-copy").unwrap();
    let err: FileSystemError = fs.copy(&source, &target, &[]).await.unwrap_err();

    assert!(matches!(err, FileSystemError::Storage { .. }));
    assert_eq!(h.store.counters().get(StoreOperation::AbortMultipartUpload), 1);
    assert_eq!(h.store.counters().get(StoreOperation::CompleteMultipartUpload), 0);
    assert_eq!(h.store.pending_uploads(), 0);
    assert!(h.store.object_data(BUCKET, "big-copy").is_none());
}

#[tokio::test]
async fn test_copy_onto_existing_needs_replace() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "src", "new");
    h.store.insert_object(BUCKET, "dst", "old");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let source: ObjectPath = fs.get_path("/bucket/src").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/dst").unwrap();

    assert!(matches!(
        fs.copy(&source, &target, &[]).await,
        Err(FileSystemError::AlreadyExists { .. })
    ));
    assert_eq!(h.store.object_data(BUCKET, "dst").unwrap(), b"old");

    fs.copy(&source, &target, &[CopyOption::ReplaceExisting])
        .await
        .unwrap();
    assert_eq!(h.store.object_data(BUCKET, "dst").unwrap(), b"new");
}

#[tokio::test]
async fn test_copy_rejects_directories_and_unknown_options() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "dir/child", "x");
    h.store.insert_object(BUCKET, "file", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let dir: ObjectPath = fs.get_path("/bucket/dir").unwrap();
    let file: ObjectPath = fs.get_path("/bucket/file").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/target").unwrap();

    assert!(matches!(
        fs.copy(&dir, &target, &[]).await,
        Err(FileSystemError::Unsupported { .. })
    ));
    assert!(matches!(
        fs.copy(&file, &target, &[CopyOption::CopyAttributes]).await,
        Err(FileSystemError::Unsupported { .. })
    ));
    assert!(h.store.object_data(BUCKET, "target").is_none());
}

#[tokio::test]
async fn test_copy_to_same_path_does_nothing() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "same", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let path: ObjectPath = fs.get_path("/bucket/same").unwrap();
    fs.copy(&path, &path.clone(), &[]).await.unwrap();

    assert_eq!(h.store.counters().total(), 0);
}

#[tokio::test]
async fn test_move_copies_then_deletes() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "from", "moved");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let source: ObjectPath = fs.get_path("/bucket/from").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/to").unwrap();
    fs.move_path(&source, &target, &[]).await.unwrap();

    assert_eq!(h.store.keys(BUCKET), vec!["to"]);
    assert_eq!(h.store.object_data(BUCKET, "to").unwrap(), b"moved");
}

#[tokio::test]
async fn test_atomic_move_fails_before_any_request() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "from", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let source: ObjectPath = fs.get_path("/bucket/from").unwrap();
    let target: ObjectPath = fs.get_path("/bucket/to").unwrap();
    let err: FileSystemError = fs
        .move_path(&source, &target, &[CopyOption::AtomicMove])
        .await
        .unwrap_err();

    assert!(matches!(err, FileSystemError::AtomicMoveUnsupported { .. }));
    assert_eq!(h.store.counters().total(), 0);
    assert_eq!(h.store.keys(BUCKET), vec!["from"]);
}

#[tokio::test]
async fn test_delete_if_exists_removes_file_and_marker() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "both", "x");
    h.store.insert_object(BUCKET, "both/", "");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let path: ObjectPath = fs.get_path("/bucket/both").unwrap();

    assert!(fs.delete_if_exists(&path).await.unwrap());
    assert_eq!(h.store.counters().get(StoreOperation::DeleteObject), 2);
    assert!(h.store.keys(BUCKET).is_empty());

    // Nothing left to delete; still succeeds.
    assert!(fs.delete_if_exists(&path).await.unwrap());
    assert_eq!(h.store.counters().get(StoreOperation::DeleteObject), 4);
}

#[tokio::test]
async fn test_delete_if_exists_reports_failure_after_both_deletes() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "kept", "x");
    h.store.fail_on(
        StoreOperation::DeleteObject,
        StorageError::service(500, "injected"),
    );
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let path: ObjectPath = fs.get_path("/bucket/kept").unwrap();
    let err: FileSystemError = fs.delete_if_exists(&path).await.unwrap_err();

    assert!(matches!(
        err,
        FileSystemError::Storage {
            source: StorageError::Service { status: 500, .. },
            ..
        }
    ));
    assert_eq!(h.store.counters().get(StoreOperation::DeleteObject), 2);
    assert_eq!(h.store.keys(BUCKET), vec!["kept"]);
}

#[tokio::test]
async fn test_delete_reports_failure_after_both_deletes() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "kept", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());
    h.store.fail_on(
        StoreOperation::DeleteObject,
        StorageError::service(500, "injected"),
    );

    let path: ObjectPath = fs.get_path("/bucket/kept").unwrap();
    let err: FileSystemError = fs.delete(&path).await.unwrap_err();

    assert!(matches!(err, FileSystemError::Storage { .. }));
    assert_eq!(h.store.counters().get(StoreOperation::DeleteObject), 2);
    assert_eq!(h.store.keys(BUCKET), vec!["kept"]);

    h.store.clear_failures();
    fs.delete(&path).await.unwrap();
    assert!(h.store.keys(BUCKET).is_empty());
}

#[tokio::test]
async fn test_move_onto_itself_keeps_the_object() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "same", "stays");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let path: ObjectPath = fs.get_path("/bucket/same").unwrap();
    fs.move_path(&path, &path.clone(), &[]).await.unwrap();

    assert_eq!(h.store.counters().get(StoreOperation::DeleteObject), 0);
    assert_eq!(h.store.object_data(BUCKET, "same").unwrap(), b"stays");
}

#[tokio::test]
async fn test_set_times_survives_in_metadata() {
    let h: Harness = harness();
    h.store.insert_object(BUCKET, "stamped", "x");
    let fs: Arc<ObjectFileSystem> = h.open(&FileSystemProperties::new());

    let mut path: ObjectPath = fs.get_path("/bucket/stamped").unwrap();
    let when: std::time::SystemTime =
        std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
    fs.set_times(&path, Some(when), None, Some(when)).await.unwrap();

    let attrs: FileAttributes = fs
        .read_attributes(&mut path, AttributeView::Basic)
        .await
        .unwrap();
    assert_eq!(attrs.basic().last_modified_time, Some(when));
    assert_eq!(attrs.basic().creation_time, Some(when));
    assert_eq!(h.store.object_data(BUCKET, "stamped").unwrap(), b"x");
}
