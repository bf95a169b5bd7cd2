//! Server-side copy and delete primitives.
//!
//! Objects up to [`PARALLEL_SIZE_THRESHOLD`] bytes are copied with a single
//! request. Larger objects are copied as a multipart upload whose parts run
//! concurrently on a per-call [`JoinSet`], bounded by a semaphore sized from
//! the object size.

use std::sync::Arc;

use bucketfs_storage::{
    ByteRange, CompletedPart, CopyObjectRequest, ObjectMetadata, ObjectStoreClient, StorageError,
    UploadPartCopyRequest, MAX_UPLOAD_PARTS,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::FileSystemError;
use crate::path::{ObjectPath, SEPARATOR};

/// Objects larger than this are copied in parallel parts.
pub const PARALLEL_SIZE_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Objects larger than this get the bigger worker pool.
pub const LARGE_OBJECT_THRESHOLD: u64 = 1024 * 1024 * 1204;

/// Default size of one part of a parallel copy.
pub const DEFAULT_COPY_PART_SIZE: u64 = 100 * 1024 * 1024;

const SMALL_POOL_WORKERS: usize = 10;
const LARGE_POOL_WORKERS: usize = 20;

/// Options accepted by copy and move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyOption {
    /// Overwrite an existing target.
    ReplaceExisting,
    /// Copy attributes along with content. Not supported.
    CopyAttributes,
    /// Move atomically. Not supported.
    AtomicMove,
    /// Do not follow links. Not supported.
    NoFollowLinks,
}

/// How an object of a given size is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    /// One server-side copy request.
    Single,
    /// Multipart copy with up to `workers` parts in flight.
    Parallel {
        /// Concurrent part copies.
        workers: usize,
    },
}

impl CopyStrategy {
    /// Choose the strategy for an object of `size` bytes.
    pub fn for_size(size: u64) -> Self {
        if size <= PARALLEL_SIZE_THRESHOLD {
            CopyStrategy::Single
        } else if size > LARGE_OBJECT_THRESHOLD {
            CopyStrategy::Parallel {
                workers: LARGE_POOL_WORKERS,
            }
        } else {
            CopyStrategy::Parallel {
                workers: SMALL_POOL_WORKERS,
            }
        }
    }
}

/// Check copy options.
///
/// # Returns
/// Whether `ReplaceExisting` was requested.
///
/// # Errors
/// `Unsupported` for any option other than `ReplaceExisting`.
pub fn check_copy_options(options: &[CopyOption]) -> Result<bool, FileSystemError> {
    let unsupported: Vec<&CopyOption> = options
        .iter()
        .filter(|o: &&CopyOption| **o != CopyOption::ReplaceExisting)
        .collect();
    if !unsupported.is_empty() {
        return Err(FileSystemError::unsupported(format!(
            "copy options {unsupported:?}"
        )));
    }
    Ok(options.contains(&CopyOption::ReplaceExisting))
}

/// Part size for a parallel copy of `size` bytes.
///
/// At least `configured`, and large enough that the copy fits within the
/// store's part limit.
pub fn effective_part_size(size: u64, configured: u64) -> u64 {
    configured.max(size.div_ceil(MAX_UPLOAD_PARTS)).max(1)
}

/// Split `size` bytes into consecutive inclusive ranges of `part_size`.
pub fn part_ranges(size: u64, part_size: u64) -> Vec<ByteRange> {
    let part_size: u64 = part_size.max(1);
    let mut ranges: Vec<ByteRange> = Vec::new();
    let mut offset: u64 = 0;
    while offset < size {
        let len: u64 = part_size.min(size - offset);
        if let Some(range) = ByteRange::from_offset(offset, len) {
            ranges.push(range);
        }
        offset += len;
    }
    ranges
}

/// Copy one object, replacing the target's metadata with `metadata`.
///
/// # Arguments
/// * `client` - Store client
/// * `request` - Source and target; `new_metadata` is overwritten
/// * `metadata` - Metadata of the copy; its length selects the strategy
/// * `part_size` - Configured part size for parallel copies
/// * `error_path` - Path reported in errors
pub async fn copy_object(
    client: &Arc<dyn ObjectStoreClient>,
    request: CopyObjectRequest,
    metadata: ObjectMetadata,
    part_size: u64,
    error_path: &ObjectPath,
) -> Result<(), FileSystemError> {
    let size: u64 = metadata.content_length;
    let request: CopyObjectRequest = request.with_new_metadata(metadata);
    let strategy: CopyStrategy = CopyStrategy::for_size(size);
    tracing::debug!(
        source = %format!("{}/{}", request.source_bucket, request.source_key),
        target = %format!("{}/{}", request.target_bucket, request.target_key),
        size,
        ?strategy,
        "copying object"
    );

    let result: Result<(), StorageError> = match strategy {
        CopyStrategy::Single => client.copy_object(&request).await,
        CopyStrategy::Parallel { workers } => {
            let part_size: u64 = effective_part_size(size, part_size);
            parallel_copy(client, &request, size, part_size, workers).await
        }
    };
    result.map_err(|e| FileSystemError::from_storage(e, error_path))
}

async fn parallel_copy(
    client: &Arc<dyn ObjectStoreClient>,
    request: &CopyObjectRequest,
    size: u64,
    part_size: u64,
    workers: usize,
) -> Result<(), StorageError> {
    let metadata: ObjectMetadata = request.new_metadata.clone().unwrap_or_default();
    let upload_id: String = client
        .create_multipart_upload(&request.target_bucket, &request.target_key, &metadata)
        .await?;

    let copied: Result<(), StorageError> =
        match copy_parts(client, request, &upload_id, size, part_size, workers).await {
            Ok(parts) => {
                client
                    .complete_multipart_upload(
                        &request.target_bucket,
                        &request.target_key,
                        &upload_id,
                        &parts,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

    if let Err(e) = &copied {
        tracing::warn!("Multipart copy {} failed: {}", upload_id, e);
        if let Err(abort_err) = client
            .abort_multipart_upload(&request.target_bucket, &request.target_key, &upload_id)
            .await
        {
            tracing::warn!("Failed to abort multipart copy {}: {}", upload_id, abort_err);
        }
    }
    copied
}

async fn copy_parts(
    client: &Arc<dyn ObjectStoreClient>,
    request: &CopyObjectRequest,
    upload_id: &str,
    size: u64,
    part_size: u64,
    workers: usize,
) -> Result<Vec<CompletedPart>, StorageError> {
    let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(workers));
    // Dropping the set on an early return aborts the parts still running.
    let mut tasks: JoinSet<Result<CompletedPart, StorageError>> = JoinSet::new();

    for (index, range) in part_ranges(size, part_size).into_iter().enumerate() {
        let client: Arc<dyn ObjectStoreClient> = Arc::clone(client);
        let semaphore: Arc<Semaphore> = Arc::clone(&semaphore);
        let part: UploadPartCopyRequest = UploadPartCopyRequest {
            source_bucket: request.source_bucket.clone(),
            source_key: request.source_key.clone(),
            target_bucket: request.target_bucket.clone(),
            target_key: request.target_key.clone(),
            upload_id: upload_id.to_string(),
            part_number: index as i32 + 1,
            range,
        };
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| StorageError::TransferInterrupted {
                    message: e.to_string(),
                })?;
            client.upload_part_copy(&part).await
        });
    }

    let mut parts: Vec<CompletedPart> = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let part: CompletedPart = joined.map_err(|e| StorageError::TransferInterrupted {
            message: e.to_string(),
        })??;
        parts.push(part);
    }
    parts.sort_by_key(|p: &CompletedPart| p.part_number);
    Ok(parts)
}

/// Delete both `key` and its `key/` marker concurrently.
///
/// Both deletes are always issued and awaited. A missing object or bucket is
/// not an error; the first other failure is reported.
pub async fn delete_key_and_marker(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    key: &str,
    error_path: &ObjectPath,
) -> Result<(), FileSystemError> {
    let marker: String = format!("{key}{SEPARATOR}");
    tracing::debug!("Deleting {}/{} and its directory marker", bucket, key);

    let (file, directory): (Result<(), StorageError>, Result<(), StorageError>) = tokio::join!(
        client.delete_object(bucket, key),
        client.delete_object(bucket, &marker)
    );
    for result in [file, directory] {
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(FileSystemError::from_storage(e, error_path)),
        }
    }
    Ok(())
}
