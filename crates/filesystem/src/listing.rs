//! Lazy directory listing.
//!
//! A [`DirectoryStream`] pages through the store with a `/` delimiter as it
//! is polled. Between pages it only keeps the file children whose directory
//! entry could still arrive on a later page. It cannot be restarted; listing
//! the same directory again issues new list requests.

use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::try_stream;
use bucketfs_storage::{ListObjectsPage, ListObjectsRequest, ObjectStoreClient, ObjectSummary};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};

use crate::attributes::{BasicFileAttributes, CachedAttributes, FileAttributes};
use crate::error::FileSystemError;
use crate::path::{ObjectPath, SEPARATOR};
use crate::resolver::{require_bucket, EntryTags};

/// Children of a directory, produced one page at a time.
///
/// Each child carries a basic attributes snapshot taken from the listing,
/// so reading its attributes right away needs no further request.
pub struct DirectoryStream {
    inner: BoxStream<'static, Result<ObjectPath, FileSystemError>>,
}

impl DirectoryStream {
    /// List the immediate children of `directory`.
    ///
    /// The caller is responsible for checking that `directory` exists and is
    /// a directory.
    ///
    /// # Arguments
    /// * `client` - Store client
    /// * `directory` - Absolute directory path
    /// * `page_size` - Entries requested per list call
    pub(crate) fn new(
        client: Arc<dyn ObjectStoreClient>,
        directory: ObjectPath,
        page_size: usize,
    ) -> Self {
        Self {
            inner: list_children(client, directory, page_size),
        }
    }

    /// Keep only the children accepted by `predicate`.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&ObjectPath) -> bool + Send + Sync + 'static,
    {
        let inner = self
            .inner
            .try_filter(move |path: &ObjectPath| futures::future::ready(predicate(path)))
            .boxed();
        Self { inner }
    }
}

impl Stream for DirectoryStream {
    type Item = Result<ObjectPath, FileSystemError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

fn list_children(
    client: Arc<dyn ObjectStoreClient>,
    directory: ObjectPath,
    page_size: usize,
) -> BoxStream<'static, Result<ObjectPath, FileSystemError>> {
    try_stream! {
        let bucket: String = require_bucket(&directory)?.to_string();
        let prefix: String = directory.directory_key();
        let mut token: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        // Children whose tags a later page may still extend.
        let mut held: BTreeMap<String, Child> = BTreeMap::new();

        loop {
            let request: ListObjectsRequest = ListObjectsRequest::new(bucket.as_str(), prefix.as_str())
                .with_delimiter(SEPARATOR.to_string())
                .with_max_keys(page_size)
                .with_continuation_token(token.take());
            let page: ListObjectsPage = client
                .list_objects(&request)
                .await
                .map_err(|e| FileSystemError::from_storage(e, &directory))?;
            tracing::trace!(
                directory = %directory,
                objects = page.objects.len(),
                prefixes = page.common_prefixes.len(),
                "listed page"
            );

            merge_page(&mut held, &bucket, &prefix, &page);
            let last_page: bool = page.next_continuation_token.is_none();
            let frontier: Option<&str> = page_frontier(&page);

            let ready: Vec<String> = held
                .iter()
                .filter(|(name, child)| last_page || child.is_settled(&prefix, name, frontier))
                .map(|(name, _)| name.clone())
                .collect();
            for name in ready {
                let Some(child) = held.remove(&name) else {
                    continue;
                };
                if seen.insert(name.clone()) {
                    yield child.into_path(&directory, &name);
                }
            }

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
    }
    .boxed()
}

struct Child {
    tags: EntryTags,
    file_key: String,
    summary: Option<ObjectSummary>,
}

impl Child {
    /// Whether no later page can add a tag to this child.
    ///
    /// A directory entry `name/` sorts after the file `name`, so a file-only
    /// child can still become a directory until the listing has passed
    /// `prefix + name + "/"`.
    fn is_settled(&self, prefix: &str, name: &str, frontier: Option<&str>) -> bool {
        if self.tags.is_directory() {
            return true;
        }
        let directory_key: String = format!("{prefix}{name}{SEPARATOR}");
        frontier.map_or(false, |last: &str| last >= directory_key.as_str())
    }

    fn into_path(self, directory: &ObjectPath, name: &str) -> ObjectPath {
        let attributes: BasicFileAttributes = match &self.summary {
            Some(summary) => BasicFileAttributes::from_summary(summary, self.tags),
            None => BasicFileAttributes::directory(self.file_key),
        };
        let mut path: ObjectPath = directory.child(name, !self.tags.is_file());
        path.attach_attributes(CachedAttributes::fetched_now(FileAttributes::Basic(
            attributes,
        )));
        path
    }
}

/// Greatest key or common prefix of a page; the listing has covered every
/// key up to it.
fn page_frontier(page: &ListObjectsPage) -> Option<&str> {
    let last_object: Option<&str> = page.objects.last().map(|o: &ObjectSummary| o.key.as_str());
    let last_prefix: Option<&str> = page.common_prefixes.last().map(String::as_str);
    last_object.max(last_prefix)
}

/// Merge the objects and common prefixes of a page into one entry per name.
fn merge_page(
    children: &mut BTreeMap<String, Child>,
    bucket: &str,
    prefix: &str,
    page: &ListObjectsPage,
) {
    for common in &page.common_prefixes {
        let Some(name) = common
            .strip_prefix(prefix)
            .and_then(|rest: &str| rest.strip_suffix(SEPARATOR))
            .filter(|name: &&str| !name.is_empty())
        else {
            continue;
        };
        children
            .entry(name.to_string())
            .or_insert_with(|| Child {
                tags: EntryTags::empty(),
                file_key: format!("{bucket}/{common}"),
                summary: None,
            })
            .tags |= EntryTags::DIRECTORY;
    }

    for summary in &page.objects {
        // The directory's own marker.
        if summary.key == prefix {
            continue;
        }
        let Some(rest) = summary.key.strip_prefix(prefix) else {
            continue;
        };
        let (name, tag): (&str, EntryTags) = match rest.strip_suffix(SEPARATOR) {
            Some(name) => (name, EntryTags::DIRECTORY),
            None => (rest, EntryTags::FILE),
        };
        if name.is_empty() {
            continue;
        }
        let child: &mut Child = children.entry(name.to_string()).or_insert_with(|| Child {
            tags: EntryTags::empty(),
            file_key: format!("{bucket}/{}", summary.key),
            summary: None,
        });
        child.tags |= tag;
        if tag.is_file() {
            child.file_key = format!("{bucket}/{}", summary.key);
            child.summary = Some(summary.clone());
        }
    }
}
