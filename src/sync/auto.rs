//! Background synchronization of open files.
//!
//! Every file handed to `start_sync` gets its own `QueueExecutor`. The first
//! queued sync always runs, which seeds the document; later ones (one per
//! local edit) run only while auto-sync is enabled.

use crate::events::{FileEvent, FileEventListener};
use crate::queue::QueueExecutor;
use crate::sync::{ContentSynchronizer, SyncProvider, SynchronizerRegistry};
use crate::vfs::{FileHandle, FileSystem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Why `start_sync` refused a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncRejection {
    #[error("directories are not synchronized")]
    Directory,
    #[error("file handle is no longer valid")]
    InvalidHandle,
    #[error("no synchronizer accepts this file")]
    NoSynchronizer,
    #[error("file is already synchronized")]
    AlreadySynced,
}

struct Inner {
    synchronizers: SynchronizerRegistry,
    fs: Arc<dyn FileSystem>,
    enabled: Arc<AtomicBool>,
    throttle: Duration,
    executors: Mutex<HashMap<FileHandle, Arc<QueueExecutor<()>>>>,
}

impl Inner {
    fn executor(&self, file: &FileHandle) -> Option<Arc<QueueExecutor<()>>> {
        self.executors.lock().ok()?.get(file).cloned()
    }

    fn trigger(&self, file: &FileHandle) -> bool {
        match self.executor(file) {
            Some(executor) => executor.accept(()),
            None => false,
        }
    }

    fn remove(&self, file: &FileHandle) -> bool {
        let removed = self
            .executors
            .lock()
            .ok()
            .and_then(|mut executors| executors.remove(file));
        match removed {
            Some(executor) => {
                executor.shutdown();
                debug!(file = %file, "stopped background sync");
                true
            }
            None => false,
        }
    }
}

impl FileEventListener for Inner {
    fn on_event(&self, event: &FileEvent) {
        match event {
            FileEvent::ContentChanged(file) => {
                self.trigger(file);
            }
            FileEvent::Deleted(file) => {
                self.remove(file);
            }
        }
    }
}

pub struct AutoSyncService {
    inner: Arc<Inner>,
}

impl AutoSyncService {
    pub fn new(
        synchronizers: SynchronizerRegistry,
        fs: Arc<dyn FileSystem>,
        auto_sync: bool,
        throttle: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                synchronizers,
                fs,
                enabled: Arc::new(AtomicBool::new(auto_sync)),
                throttle,
                executors: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Listener to subscribe on the file event bus.
    pub fn listener(&self) -> Arc<dyn FileEventListener> {
        self.inner.clone()
    }

    pub fn set_auto_sync(&self, enabled: bool) {
        info!(enabled, "auto-sync toggled");
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_auto_sync_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Register `provider`'s file and queue its initial synchronization.
    pub fn start_sync(&self, provider: Arc<dyn SyncProvider>) -> Result<(), SyncRejection> {
        let file = provider.file().clone();
        if file.is_directory() {
            return Err(SyncRejection::Directory);
        }
        if !self.inner.fs.is_valid(&file) {
            return Err(SyncRejection::InvalidHandle);
        }
        let synchronizer = self
            .inner
            .synchronizers
            .find(&file)
            .ok_or(SyncRejection::NoSynchronizer)?;

        let executor = {
            let mut executors = self
                .inner
                .executors
                .lock()
                .map_err(|_| SyncRejection::AlreadySynced)?;
            if executors.contains_key(&file) {
                return Err(SyncRejection::AlreadySynced);
            }
            let enabled = Arc::clone(&self.inner.enabled);
            let executor = Arc::new(QueueExecutor::new(self.inner.throttle, move || {
                enabled.load(Ordering::SeqCst)
            }));
            executors.insert(file.clone(), Arc::clone(&executor));
            executor
        };

        executor.launch(sync_handler(synchronizer, provider));
        executor.accept(());
        debug!(file = %file, "started background sync");
        Ok(())
    }

    /// Queue another synchronization of `file`. False if it is not registered.
    pub fn trigger_sync(&self, file: &FileHandle) -> bool {
        self.inner.trigger(file)
    }

    pub fn is_already_synced(&self, file: &FileHandle) -> bool {
        self.inner.executor(file).is_some()
    }

    pub fn remove_sync(&self, file: &FileHandle) -> bool {
        self.inner.remove(file)
    }

    pub fn shutdown(&self) {
        let executors: Vec<_> = match self.inner.executors.lock() {
            Ok(mut executors) => executors.drain().map(|(_, e)| e).collect(),
            Err(_) => return,
        };
        for executor in executors {
            executor.shutdown();
        }
    }
}

fn sync_handler(
    synchronizer: Arc<dyn ContentSynchronizer>,
    provider: Arc<dyn SyncProvider>,
) -> impl FnMut(()) + Send + 'static {
    move |()| synchronizer.synchronize_with_remote(provider.as_ref(), None)
}
