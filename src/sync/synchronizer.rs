//! The synchronization engine shared by every content category.
//!
//! Per file the engine remembers three things: the storage record holding the
//! content both sides last agreed on, whether the file was fetched at least
//! once, and whether the editor reported a local edit since the last sync.

use crate::attributes::{AttributesService, EntityCategory, FileAttributes};
use crate::error::{Result, SyncError};
use crate::events::{FileEvent, FileEventBus, FileEventListener};
use crate::progress::{self, ProgressIndicator};
use crate::storage::{ContentStorage, RecordId};
use crate::sync::{ContentSynchronizer, RemoteContentAccess, SyncProvider};
use crate::vfs::{FileHandle, FileKind};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Prefix of the storage name each synchronizer keeps its records in.
pub const SYNC_STORAGE_PREFIX: &str = "sync_storage_";

/// Storage name for a category, e.g. `sync_storage_members`.
pub fn storage_name(category: EntityCategory) -> String {
    format!("{SYNC_STORAGE_PREFIX}{}", category.entity_name())
}

#[derive(Default)]
struct SyncState {
    record_ids: RwLock<HashMap<FileHandle, RecordId>>,
    fetched_at_least_once: Mutex<HashSet<FileHandle>>,
    needs_upload: Mutex<HashSet<FileHandle>>,
    syncing_now: Mutex<HashSet<FileHandle>>,
}

impl SyncState {
    fn contains(set: &Mutex<HashSet<FileHandle>>, file: &FileHandle) -> bool {
        set.lock().map(|s| s.contains(file)).unwrap_or(false)
    }

    fn insert(set: &Mutex<HashSet<FileHandle>>, file: &FileHandle) -> bool {
        set.lock().map(|mut s| s.insert(file.clone())).unwrap_or(false)
    }

    fn remove(set: &Mutex<HashSet<FileHandle>>, file: &FileHandle) {
        if let Ok(mut s) = set.lock() {
            s.remove(file);
        }
    }
}

impl FileEventListener for SyncState {
    fn on_event(&self, event: &FileEvent) {
        match event {
            FileEvent::ContentChanged(file) => {
                SyncState::insert(&self.needs_upload, file);
            }
            FileEvent::Deleted(file) => {
                SyncState::remove(&self.fetched_at_least_once, file);
                SyncState::remove(&self.needs_upload, file);
            }
        }
    }
}

/// Marks a file as being synchronized for the guard's lifetime.
struct SyncingGuard<'a> {
    state: &'a SyncState,
    file: FileHandle,
}

impl<'a> SyncingGuard<'a> {
    fn acquire(state: &'a SyncState, file: &FileHandle) -> Option<Self> {
        SyncState::insert(&state.syncing_now, file).then(|| Self {
            state,
            file: file.clone(),
        })
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        SyncState::remove(&self.state.syncing_now, &self.file);
    }
}

pub struct RemoteContentSynchronizer<A> {
    access: A,
    attributes: Arc<dyn AttributesService>,
    storage: ContentStorage,
    state: Arc<SyncState>,
}

impl<A: RemoteContentAccess> RemoteContentSynchronizer<A> {
    /// Build a synchronizer and subscribe it to local edit notifications.
    pub fn new(
        access: A,
        attributes: Arc<dyn AttributesService>,
        storage: ContentStorage,
        events: &FileEventBus,
    ) -> Self {
        let state = Arc::new(SyncState::default());
        events.subscribe(state.clone());
        Self {
            access,
            attributes,
            storage,
            state,
        }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn storage(&self) -> &ContentStorage {
        &self.storage
    }

    pub fn was_fetched_before(&self, file: &FileHandle) -> bool {
        SyncState::contains(&self.state.fetched_at_least_once, file)
    }

    fn record_id_for(&self, file: &FileHandle) -> Result<RecordId> {
        if let Some(id) = self.existing_record_id(file) {
            return Ok(id);
        }
        let mut ids = self
            .state
            .record_ids
            .write()
            .map_err(|_| SyncError::Storage("record map lock poisoned".to_string()))?;
        Ok(*ids
            .entry(file.clone())
            .or_insert_with(|| self.storage.create_new_record()))
    }

    fn existing_record_id(&self, file: &FileHandle) -> Option<RecordId> {
        self.state.record_ids.read().ok()?.get(file).copied()
    }

    fn attributes_of(&self, file: &FileHandle) -> Result<FileAttributes> {
        self.attributes
            .get_attributes(file)
            .ok_or_else(|| SyncError::NoAttributes(file.path().to_string()))
    }

    fn run_sync(
        &self,
        provider: &dyn SyncProvider,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()> {
        let file = provider.file();
        info!(file = %file, "starting synchronization");
        progress::set_text(
            progress,
            &format!("Synchronizing file {} with mainframe", file.name()),
        );

        let record_id = self.record_id_for(file)?;
        let attributes = self.attributes_of(file)?;
        let first_sync = !self.was_fetched_before(file);

        let charset = first_sync.then(|| self.access.detect_encoding(file, &attributes, progress));

        let fetched = self.access.fetch_remote_content(&attributes, progress)?;
        let adapter = self.access.content_adapter(&attributes)?;
        let adapted = adapter.adapt_from_mainframe(&fetched);

        if let Some(charset) = charset {
            info!(file = %file, %charset, "setting initial content");
            provider.put_initial_content(&adapted)?;
            provider.set_encoding(&charset);
            self.storage.write(record_id, &adapted)?;
            SyncState::insert(&self.state.fetched_at_least_once, file);
        } else {
            let current = provider.retrieve_current_content()?;
            if current != adapted {
                let last_successful = self.storage.get_bytes(record_id)?;
                let do_upload = provider
                    .save_strategy()
                    .decide(file, &last_successful, &adapted);

                if do_upload && !provider.is_read_only() && self.is_upload_pending(file) {
                    info!(file = %file, "save strategy decided to update content on mainframe");
                    let prepared = adapter.prepare_to_mainframe(&current);
                    provider.load_new_content(&prepared)?;
                    self.access
                        .upload_new_content(&attributes, &prepared, progress)?;
                    self.storage.write(record_id, &prepared)?;
                } else {
                    info!(file = %file, "save strategy decided to accept remote content");
                    self.storage.write(record_id, &adapted)?;
                    provider.load_new_content(&adapted)?;
                }
            } else {
                debug!(file = %file, "local content matches remote");
            }
        }

        // Also drops an edit reported while this cycle was running; the
        // follow-up sync then treats the document as unedited.
        SyncState::remove(&self.state.needs_upload, file);
        Ok(())
    }

    fn is_upload_pending(&self, file: &FileHandle) -> bool {
        SyncState::contains(&self.state.needs_upload, file)
    }
}

impl<A: RemoteContentAccess> ContentSynchronizer for RemoteContentSynchronizer<A> {
    fn category(&self) -> EntityCategory {
        self.access.category()
    }

    fn accepts(&self, file: &FileHandle) -> bool {
        file.kind() == FileKind::MfFile
            && self.attributes.get_attributes(file).is_some_and(|attrs| {
                attrs.category() == self.access.category() && self.access.accepts_attributes(&attrs)
            })
    }

    fn synchronize_with_remote(
        &self,
        provider: &dyn SyncProvider,
        progress: Option<&dyn ProgressIndicator>,
    ) {
        let Some(_guard) = SyncingGuard::acquire(&self.state, provider.file()) else {
            // No provider callback for a skipped call.
            debug!(file = %provider.file(), "file is already being synchronized");
            return;
        };

        match self.run_sync(provider, progress) {
            Ok(()) => provider.on_sync_success(),
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(file = %provider.file(), error = %e, "synchronization failed");
                }
                provider.on_throwable(e);
            }
        }
    }

    fn successful_content_storage(&self, provider: &dyn SyncProvider) -> Bytes {
        self.existing_record_id(provider.file())
            .and_then(|id| self.storage.get_bytes(id).ok())
            .unwrap_or_default()
    }

    fn is_file_upload_needed(&self, provider: &dyn SyncProvider) -> bool {
        self.is_upload_pending(provider.file())
    }

    fn mark_as_not_needed_for_sync(&self, provider: &dyn SyncProvider) {
        SyncState::remove(&self.state.needs_upload, provider.file());
    }

    fn is_file_syncing_now(&self, file: &FileHandle) -> bool {
        SyncState::contains(&self.state.syncing_now, file)
    }
}
