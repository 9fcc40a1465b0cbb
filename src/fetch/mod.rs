//! Query-keyed listing cache.
//!
//! A `RemoteQuery` names a connection and a category-specific request. The
//! fetch provider for that category runs the listing, turns every entry into
//! a virtual file through the attributes service and caches the handles under
//! the query. Batched queries page through large listings and carry their
//! cursor in a shared `BatchProgress`.

pub mod batched;
pub mod dataset;
pub mod job;
pub mod job_log;
pub mod member;
pub mod provider;
pub mod spool;
pub mod uss;

pub use batched::{BatchedFetch, BatchedSource};
pub use dataset::DatasetFetch;
pub use job::JobFetch;
pub use member::{LibraryQuery, MemberFetch};
pub use provider::RemoteFileFetchProvider;
pub use spool::{JobQuery, SpoolFetch};
pub use uss::{UssFetch, UssQuery};

use crate::attributes::{AttributesService, EntityCategory, FileAttributes, Requester};
use crate::connection::ConnectionConfig;
use crate::error::{Result, SyncError};
use crate::progress::ProgressIndicator;
use crate::vfs::{FileHandle, FileSystem};
use chrono::{DateTime, Local};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Anything usable as the request half of a query.
pub trait QueryRequest: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> QueryRequest for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

// =============================================================================
// Queries
// =============================================================================

/// Pagination cursor of a batched query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub already_fetched: usize,
    pub fetch_needed: bool,
    /// Name of the last item fetched so far.
    pub start: Option<String>,
    /// Row count reported by the first page.
    pub total_rows: Option<usize>,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            already_fetched: 0,
            fetch_needed: true,
            start: None,
            total_rows: None,
        }
    }
}

impl BatchProgress {
    /// The next reload appends a page instead of replacing the listing.
    pub fn is_continuation(&self) -> bool {
        self.fetch_needed && self.already_fetched > 0
    }
}

/// Connection plus request. Clones share the batch cursor.
///
/// Equality and hashing ignore the cursor, so a freshly built query finds the
/// cache entry of an earlier, partially paged one.
#[derive(Clone)]
pub struct RemoteQuery<R> {
    pub connection: ConnectionConfig,
    pub request: R,
    batch: Option<Arc<Mutex<BatchProgress>>>,
}

impl<R: QueryRequest> RemoteQuery<R> {
    /// A query listed in one request.
    pub fn unit(connection: ConnectionConfig, request: R) -> Self {
        Self {
            connection,
            request,
            batch: None,
        }
    }

    /// A query listed page by page.
    pub fn batched(connection: ConnectionConfig, request: R) -> Self {
        Self {
            connection,
            request,
            batch: Some(Arc::new(Mutex::new(BatchProgress::default()))),
        }
    }

    pub fn is_batched(&self) -> bool {
        self.batch.is_some()
    }

    /// Snapshot of the cursor; `None` for unit queries.
    pub fn progress(&self) -> Option<BatchProgress> {
        let batch = self.batch.as_ref()?;
        batch.lock().ok().map(|p| p.clone())
    }

    /// Mutate the cursor. No-op for unit queries.
    pub fn update_progress(&self, f: impl FnOnce(&mut BatchProgress)) {
        if let Some(batch) = &self.batch {
            if let Ok(mut progress) = batch.lock() {
                f(&mut progress);
            }
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.progress().is_some_and(|p| p.is_continuation())
    }

    /// Forget every page fetched so far.
    pub fn reset_progress(&self) {
        self.update_progress(|p| *p = BatchProgress::default());
    }
}

impl<R: PartialEq> PartialEq for RemoteQuery<R> {
    fn eq(&self, other: &Self) -> bool {
        self.connection == other.connection
            && self.request == other.request
            && self.batch.is_some() == other.batch.is_some()
    }
}

impl<R: Eq> Eq for RemoteQuery<R> {}

impl<R: Hash> Hash for RemoteQuery<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.connection.hash(state);
        self.request.hash(state);
        self.batch.is_some().hash(state);
    }
}

impl<R: fmt::Debug> fmt::Debug for RemoteQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteQuery")
            .field("connection", &self.connection.name)
            .field("request", &self.request)
            .field("batched", &self.batch.is_some())
            .finish()
    }
}

// =============================================================================
// Provider surface
// =============================================================================

/// Outcome of the last reload of a query. Absent means not fetched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Fetched,
    Error,
}

/// Cache change notifications of one fetch provider.
pub trait CacheListener<R>: Send + Sync {
    fn on_cache_updated(&self, _query: &RemoteQuery<R>, _files: &[FileHandle]) {}

    fn on_cache_cleaned(&self, _query: &RemoteQuery<R>) {}

    fn on_fetch_cancelled(&self, _query: &RemoteQuery<R>) {}

    fn on_fetch_failure(&self, _query: &RemoteQuery<R>, _error: &SyncError) {}
}

pub trait FileFetchProvider<R>: Send + Sync {
    /// Run the listing for `query` and replace (or, for a continuation page,
    /// extend) its cache entry. Outcomes are reported to listeners.
    fn reload(&self, query: &RemoteQuery<R>, progress: Option<&dyn ProgressIndicator>);

    /// Fetch the next page of a batched query. False when nothing is left.
    fn load_more(&self, query: &RemoteQuery<R>, progress: Option<&dyn ProgressIndicator>) -> bool;

    /// Cached files, only while the entry is in the fetched state.
    fn get_cached(&self, query: &RemoteQuery<R>) -> Option<Vec<FileHandle>>;

    /// False only after a failed reload.
    fn is_cache_valid(&self, query: &RemoteQuery<R>) -> bool;

    fn get_fetched_error_message(&self, query: &RemoteQuery<R>) -> Option<String>;

    /// Forget the state of `query` so the next access reloads it.
    fn clean_cache(&self, query: &RemoteQuery<R>, notify: bool);

    fn subscribe(&self, listener: Arc<dyn CacheListener<R>>);

    /// Remember when the tree node `node_key` last refreshed `query`.
    fn apply_refresh_cache_date(&self, query: &RemoteQuery<R>, node_key: &str, at: DateTime<Local>);

    /// Latest refresh date recorded for `query`.
    fn find_cache_refresh_date(&self, query: &RemoteQuery<R>) -> Option<DateTime<Local>>;

    /// The cached key equal to `query`, carrying the authoritative cursor.
    fn get_real_query_instance(&self, query: &RemoteQuery<R>) -> Option<RemoteQuery<R>>;
}

/// Category-specific half of a fetch provider.
pub trait FetchSource: Send + Sync {
    type Request: QueryRequest;

    fn category(&self) -> EntityCategory;

    /// List `query`, returning one attributes record per entry.
    fn fetch(
        &self,
        query: &RemoteQuery<Self::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<FileAttributes>>;

    /// Whether `old` is still represented by `new` after a reload.
    fn compare_old_and_new(&self, old: &FileHandle, new: &FileHandle) -> bool {
        old.path() == new.path()
    }

    /// Drop a file that the latest listing of `query` no longer contains.
    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<Self::Request>);
}

// =============================================================================
// Cleanup helpers
// =============================================================================

/// Drop the record of `file` and remove it from the file system.
pub(crate) fn delete_file(attributes: &dyn AttributesService, fs: &dyn FileSystem, file: &FileHandle) {
    attributes.clear_attributes(file);
    if let Err(e) = fs.delete(file) {
        warn!(%file, error = %e, "cannot delete virtual file");
    }
}

/// Delete `file` when every requester matches; otherwise only forget the
/// matching requesters, since another query still lists the file.
pub(crate) fn prune_requesters(
    attributes: &dyn AttributesService,
    fs: &dyn FileSystem,
    file: &FileHandle,
    matches: impl Fn(&Requester) -> bool,
) {
    let Some(record) = attributes.get_attributes(file) else {
        return;
    };
    let delete = record.requesters().iter().all(&matches);
    info!(%file, delete, "cleaning up file attributes");
    if delete {
        delete_file(attributes, fs, file);
    } else {
        attributes.update_attributes(file, &mut |a| {
            if let Some(requesters) = a.requesters_mut() {
                requesters.retain(|r| !matches(r));
            }
        });
    }
}
