//! Directory walking over prefix listings.
//!
//! Listings are fetched page by page as the stream is polled; calling
//! [`list`] again re-issues the listing from the start.

use std::collections::HashSet;

use blobpath_models::{CloudPath, DirectoryEntry};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{StorageError, StorageResult};
use crate::store::{ListItem, ListRequest, ObjectStore};

/// Lazily produced directory entries.
pub type EntryStream<'a> = BoxStream<'a, StorageResult<DirectoryEntry>>;

/// An entry together with the raw store key it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WalkedEntry {
    pub store_key: String,
    pub entry: DirectoryEntry,
    /// The listed directory's own marker (e.g. an S3 `key/` object).
    pub is_own_marker: bool,
}

struct WalkState {
    root: CloudPath,
    request: ListRequest,
    exhausted: bool,
    /// Sub-directories already yielded by a shallow walk.
    seen_dirs: HashSet<String>,
}

impl WalkState {
    fn walked(&self, item: ListItem) -> WalkedEntry {
        match item {
            // Common prefixes carry a trailing slash.
            ListItem::Prefix(prefix) => WalkedEntry {
                entry: DirectoryEntry::dir(self.root.with_key(&prefix)),
                is_own_marker: false,
                store_key: prefix,
            },
            ListItem::Object(obj) => {
                let path = self.root.with_key(&obj.key);
                WalkedEntry {
                    is_own_marker: path.key() == self.root.key(),
                    entry: DirectoryEntry {
                        path,
                        is_dir: obj.is_marker || obj.key.ends_with('/'),
                    },
                    store_key: obj.key,
                }
            }
        }
    }

    /// A sub-directory with both a marker and children shows up as an object
    /// and as a common prefix; shallow walks keep only the first sighting.
    fn is_repeat(&mut self, walked: &WalkedEntry) -> bool {
        self.request.delimited
            && walked.entry.is_dir
            && !walked.is_own_marker
            && !self.seen_dirs.insert(walked.entry.path.key().to_string())
    }
}

/// Walk `path`, yielding raw entries including the directory's own marker.
pub(crate) fn walk<'a>(
    store: &'a dyn ObjectStore,
    path: &CloudPath,
    recursive: bool,
) -> BoxStream<'a, StorageResult<WalkedEntry>> {
    let state = WalkState {
        root: path.clone(),
        request: ListRequest::new(path.dir_prefix()).delimited(!recursive),
        exhausted: false,
        seen_dirs: HashSet::new(),
    };

    stream::try_unfold(state, move |mut state| async move {
        if state.exhausted {
            return Ok(None);
        }

        let page = store.list_page(state.root.container(), &state.request).await?;
        state.exhausted = page.next_token.is_none();
        state.request.continuation = page.next_token;

        let mut entries: Vec<StorageResult<WalkedEntry>> = Vec::with_capacity(page.items.len());
        for item in page.items {
            let walked = state.walked(item);
            if !state.is_repeat(&walked) {
                entries.push(Ok(walked));
            }
        }

        Ok::<_, StorageError>(Some((stream::iter(entries), state)))
    })
    .try_flatten()
    .boxed()
}

/// List the children of `path`, or every descendant when `recursive`.
///
/// Non-recursive listings report each immediate sub-directory once, from its
/// common prefix, without listing its contents. Ordering is whatever the
/// store returns.
pub fn list<'a>(store: &'a dyn ObjectStore, path: &CloudPath, recursive: bool) -> EntryStream<'a> {
    walk(store, path, recursive)
        .try_filter_map(|walked| async move {
            Ok(if walked.is_own_marker {
                None
            } else {
                Some(walked.entry)
            })
        })
        .boxed()
}
