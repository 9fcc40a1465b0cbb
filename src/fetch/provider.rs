//! Generic fetch provider over a `FetchSource`.
//!
//! All cache bookkeeping of one provider sits behind a single mutex. The
//! remote listing itself runs outside it; the lock is only taken to swap the
//! result in, clean up files that disappeared, and refresh colliding entries.

use crate::attributes::AttributesService;
use crate::error::SyncError;
use crate::fetch::{CacheListener, CacheState, FetchSource, FileFetchProvider, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

struct CacheData<R> {
    files: HashMap<RemoteQuery<R>, Vec<FileHandle>>,
    states: HashMap<RemoteQuery<R>, CacheState>,
    errors: HashMap<RemoteQuery<R>, String>,
    refresh_dates: HashMap<RemoteQuery<R>, HashMap<String, DateTime<Local>>>,
}

impl<R> Default for CacheData<R> {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            states: HashMap::new(),
            errors: HashMap::new(),
            refresh_dates: HashMap::new(),
        }
    }
}

pub struct RemoteFileFetchProvider<S: FetchSource> {
    source: S,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
    data: Mutex<CacheData<S::Request>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener<S::Request>>>>,
}

impl<S: FetchSource> RemoteFileFetchProvider<S> {
    pub fn new(source: S, attributes: Arc<dyn AttributesService>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            source,
            attributes,
            fs,
            data: Mutex::new(CacheData::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self, query: &RemoteQuery<S::Request>) -> Option<CacheState> {
        self.lock().states.get(query).copied()
    }

    fn lock(&self) -> MutexGuard<'_, CacheData<S::Request>> {
        // A panicking listener must not wedge the cache.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> Vec<Arc<dyn CacheListener<S::Request>>> {
        self.listeners.read().map(|l| l.clone()).unwrap_or_default()
    }

    fn fetch_files(
        &self,
        query: &RemoteQuery<S::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> crate::error::Result<Vec<FileHandle>> {
        progress::check_cancelled(progress)?;
        let category = self.source.category();
        progress::set_text(progress, &format!("Fetching {category} for {}", query.connection.name));
        let attributes = self.source.fetch(query, progress)?;
        progress::check_cancelled(progress)?;
        Ok(attributes
            .into_iter()
            .filter_map(|a| self.attributes.get_or_create_virtual_file(a))
            .collect())
    }

    /// Old files that are still valid but absent from `new`, each once.
    fn stale_files(&self, old: &[FileHandle], new: &[FileHandle]) -> Vec<FileHandle> {
        let stale: Vec<FileHandle> = old
            .par_iter()
            .filter(|o| self.fs.is_valid(o) && !new.iter().any(|n| self.source.compare_old_and_new(o, n)))
            .cloned()
            .collect();
        let mut seen = HashSet::new();
        stale.into_iter().filter(|f| seen.insert(f.clone())).collect()
    }

    /// Swap `files` in for `query`; returns other queries whose entries were
    /// refreshed because they share handles with `files`.
    fn store(
        &self,
        query: &RemoteQuery<S::Request>,
        files: &[FileHandle],
        continuation: bool,
    ) -> Vec<(RemoteQuery<S::Request>, Vec<FileHandle>)> {
        let mut data = self.lock();

        if continuation {
            let entry = data.files.entry(query.clone()).or_default();
            entry.extend(files.iter().cloned());
        } else {
            let old = data.files.get(query).cloned().unwrap_or_default();
            for file in self.stale_files(&old, files) {
                debug!(%file, ?query, "cleaning up file missing from the new listing");
                self.source.cleanup_unused_file(&file, query);
            }
            data.files.insert(query.clone(), files.to_vec());
        }
        data.states.insert(query.clone(), CacheState::Fetched);
        data.errors.remove(query);

        let fresh: HashSet<&FileHandle> = files.iter().collect();
        let mut collided = Vec::new();
        let others: Vec<RemoteQuery<S::Request>> = data
            .files
            .keys()
            .filter(|q| *q != query && data.states.get(*q) == Some(&CacheState::Fetched))
            .cloned()
            .collect();
        for other in others {
            if let Some(cached) = data.files.get_mut(&other) {
                let mut touched = false;
                for file in cached.iter_mut() {
                    if let Some(new) = fresh.get(file) {
                        *file = (*new).clone();
                        touched = true;
                    }
                }
                if touched {
                    collided.push((other, cached.clone()));
                }
            }
        }
        collided
    }

    fn store_failure(&self, query: &RemoteQuery<S::Request>, message: String) {
        let mut data = self.lock();
        data.files.insert(query.clone(), Vec::new());
        data.states.insert(query.clone(), CacheState::Error);
        data.errors.insert(query.clone(), message);
    }

    fn drop_entry(&self, query: &RemoteQuery<S::Request>) {
        let mut data = self.lock();
        data.states.remove(query);
        data.errors.remove(query);
    }
}

impl<S: FetchSource> FileFetchProvider<S::Request> for RemoteFileFetchProvider<S> {
    fn reload(&self, query: &RemoteQuery<S::Request>, progress: Option<&dyn ProgressIndicator>) {
        let query = self
            .get_real_query_instance(query)
            .unwrap_or_else(|| query.clone());
        let continuation = query.is_continuation();
        if query.is_batched() && !continuation {
            query.reset_progress();
        }

        match self.fetch_files(&query, progress) {
            Ok(files) => {
                info!(?query, count = files.len(), continuation, "listing fetched");
                let collided = self.store(&query, &files, continuation);
                let listeners = self.listeners();
                for listener in &listeners {
                    listener.on_cache_updated(&query, &files);
                }
                for (other, cached) in &collided {
                    debug!(query = ?other, "refreshing colliding cache entry");
                    for listener in &listeners {
                        listener.on_cache_updated(other, cached);
                    }
                }
            }
            Err(SyncError::Cancelled) => {
                debug!(?query, "fetch cancelled");
                self.drop_entry(&query);
                for listener in self.listeners() {
                    listener.on_fetch_cancelled(&query);
                }
            }
            Err(e) => {
                warn!(?query, error = %e, "fetch failed");
                self.store_failure(&query, e.display_message());
                for listener in self.listeners() {
                    listener.on_fetch_failure(&query, &e);
                }
            }
        }
    }

    fn load_more(
        &self,
        query: &RemoteQuery<S::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> bool {
        let real = self.get_real_query_instance(query);
        let pending = real
            .as_ref()
            .and_then(RemoteQuery::progress)
            .is_some_and(|p| p.is_continuation());
        if pending {
            self.reload(query, progress);
        }
        pending
    }

    fn get_cached(&self, query: &RemoteQuery<S::Request>) -> Option<Vec<FileHandle>> {
        let data = self.lock();
        match data.states.get(query) {
            Some(CacheState::Fetched) => data.files.get(query).cloned(),
            _ => None,
        }
    }

    fn is_cache_valid(&self, query: &RemoteQuery<S::Request>) -> bool {
        self.lock().states.get(query) != Some(&CacheState::Error)
    }

    fn get_fetched_error_message(&self, query: &RemoteQuery<S::Request>) -> Option<String> {
        let data = self.lock();
        match data.states.get(query) {
            Some(CacheState::Error) => data.errors.get(query).cloned(),
            _ => None,
        }
    }

    fn clean_cache(&self, query: &RemoteQuery<S::Request>, notify: bool) {
        if let Some(real) = self.get_real_query_instance(query) {
            real.reset_progress();
        }
        self.drop_entry(query);
        debug!(?query, "cache cleaned");
        if notify {
            for listener in self.listeners() {
                listener.on_cache_cleaned(query);
            }
        }
    }

    fn subscribe(&self, listener: Arc<dyn CacheListener<S::Request>>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    fn apply_refresh_cache_date(
        &self,
        query: &RemoteQuery<S::Request>,
        node_key: &str,
        at: DateTime<Local>,
    ) {
        self.lock()
            .refresh_dates
            .entry(query.clone())
            .or_default()
            .insert(node_key.to_string(), at);
    }

    fn find_cache_refresh_date(&self, query: &RemoteQuery<S::Request>) -> Option<DateTime<Local>> {
        self.lock()
            .refresh_dates
            .get(query)
            .and_then(|dates| dates.values().max().copied())
    }

    fn get_real_query_instance(
        &self,
        query: &RemoteQuery<S::Request>,
    ) -> Option<RemoteQuery<S::Request>> {
        self.lock()
            .files
            .get_key_value(query)
            .map(|(key, _)| key.clone())
    }
}
