//! Per-file sync providers: the local side of a synchronization.

use crate::content::Charset;
use crate::error::{Result, SyncError};
use crate::sync::strategy::SaveStrategy;
use crate::vfs::FileHandle;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Local document access used by a `ContentSynchronizer`.
pub trait SyncProvider: Send + Sync {
    fn file(&self) -> &FileHandle;

    fn save_strategy(&self) -> &dyn SaveStrategy;

    fn is_read_only(&self) -> bool;

    /// Seed the document on first sync. Only the first successful call has
    /// any effect.
    fn put_initial_content(&self, content: &[u8]) -> Result<()>;

    /// Replace the document content; skipped when it is already equal.
    fn load_new_content(&self, content: &[u8]) -> Result<()>;

    fn retrieve_current_content(&self) -> Result<Bytes>;

    fn set_encoding(&self, charset: &Charset);

    fn on_throwable(&self, error: SyncError);

    fn on_sync_success(&self);
}

// =============================================================================
// Documents and dispatch
// =============================================================================

/// Editable document backing a file.
pub trait Document: Send + Sync {
    fn current_content(&self) -> Bytes;

    fn set_content(&self, content: &[u8]);

    fn is_writable(&self) -> bool;

    fn set_encoding(&self, charset: &Charset);
}

/// Runs document access on the thread that owns the document and waits.
pub trait EditorDispatcher: Send + Sync {
    fn invoke_and_wait(&self, task: &mut dyn FnMut());
}

/// Runs the task inline on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectDispatcher;

impl EditorDispatcher for DirectDispatcher {
    fn invoke_and_wait(&self, task: &mut dyn FnMut()) {
        task()
    }
}

/// In-process document.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    content: Mutex<Bytes>,
    charset: Mutex<Option<Charset>>,
    read_only: AtomicBool,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<Bytes>) -> Self {
        Self {
            content: Mutex::new(content.into()),
            ..Self::default()
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn encoding(&self) -> Option<Charset> {
        self.charset.lock().ok().and_then(|c| c.clone())
    }
}

impl Document for MemoryDocument {
    fn current_content(&self) -> Bytes {
        self.content.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn set_content(&self, content: &[u8]) {
        if let Ok(mut current) = self.content.lock() {
            *current = Bytes::copy_from_slice(content);
        }
    }

    fn is_writable(&self) -> bool {
        !self.read_only.load(Ordering::SeqCst)
    }

    fn set_encoding(&self, charset: &Charset) {
        if let Ok(mut current) = self.charset.lock() {
            *current = Some(charset.clone());
        }
    }
}

// =============================================================================
// DocumentSyncProvider
// =============================================================================

type ThrowableHandler = Box<dyn Fn(&FileHandle, SyncError) + Send + Sync>;
type SuccessHandler = Box<dyn Fn(&FileHandle) + Send + Sync>;

/// `SyncProvider` over a `Document`.
///
/// Two providers are equal when they wrap the same file.
pub struct DocumentSyncProvider {
    file: FileHandle,
    document: Arc<dyn Document>,
    dispatcher: Arc<dyn EditorDispatcher>,
    strategy: Box<dyn SaveStrategy>,
    initial_content_set: AtomicBool,
    on_throwable: ThrowableHandler,
    on_success: SuccessHandler,
}

impl DocumentSyncProvider {
    pub fn new(
        file: FileHandle,
        document: Arc<dyn Document>,
        strategy: impl SaveStrategy + 'static,
    ) -> Self {
        Self {
            file,
            document,
            dispatcher: Arc::new(DirectDispatcher),
            strategy: Box::new(strategy),
            initial_content_set: AtomicBool::new(false),
            on_throwable: Box::new(default_throwable_handler),
            on_success: Box::new(|_| {}),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EditorDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn on_throwable_handler(
        mut self,
        handler: impl Fn(&FileHandle, SyncError) + Send + Sync + 'static,
    ) -> Self {
        self.on_throwable = Box::new(handler);
        self
    }

    pub fn on_success_handler(mut self, handler: impl Fn(&FileHandle) + Send + Sync + 'static) -> Self {
        self.on_success = Box::new(handler);
        self
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    fn read_document(&self) -> Bytes {
        let mut content = Bytes::new();
        self.dispatcher
            .invoke_and_wait(&mut || content = self.document.current_content());
        content
    }

    fn write_document(&self, content: &[u8]) {
        self.dispatcher
            .invoke_and_wait(&mut || self.document.set_content(content));
    }
}

fn default_throwable_handler(file: &FileHandle, error: SyncError) {
    if error.is_cancelled() {
        info!(file = %file, "synchronization cancelled");
    } else {
        warn!(file = %file, error = %error.display_message(), "synchronization failed");
    }
}

impl SyncProvider for DocumentSyncProvider {
    fn file(&self) -> &FileHandle {
        &self.file
    }

    fn save_strategy(&self) -> &dyn SaveStrategy {
        self.strategy.as_ref()
    }

    fn is_read_only(&self) -> bool {
        !self.document.is_writable()
    }

    fn put_initial_content(&self, content: &[u8]) -> Result<()> {
        if self
            .initial_content_set
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        self.load_new_content(content)
    }

    fn load_new_content(&self, content: &[u8]) -> Result<()> {
        if self.read_document() == content {
            return Ok(());
        }
        self.write_document(content);
        Ok(())
    }

    fn retrieve_current_content(&self) -> Result<Bytes> {
        Ok(self.read_document())
    }

    fn set_encoding(&self, charset: &Charset) {
        self.dispatcher
            .invoke_and_wait(&mut || self.document.set_encoding(charset));
    }

    fn on_throwable(&self, error: SyncError) {
        let message = error.to_string();
        if message.contains("Permission denied") {
            (self.on_throwable)(
                &self.file,
                SyncError::Other(format!("Permission denied. {message}")),
            );
            return;
        }
        (self.on_throwable)(&self.file, error)
    }

    fn on_sync_success(&self) {
        (self.on_success)(&self.file)
    }
}

impl PartialEq for DocumentSyncProvider {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for DocumentSyncProvider {}
