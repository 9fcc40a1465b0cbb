//! Content synchronization between editor documents and remote entities.
//!
//! `RemoteContentSynchronizer` holds the algorithm; each entity category
//! contributes only a `RemoteContentAccess` that knows how to fetch and
//! upload its bytes.

pub mod auto;
pub mod dataset;
pub mod member;
pub mod provider;
pub mod registry;
pub mod requesters;
pub mod spool;
pub mod strategy;
pub mod synchronizer;
pub mod uss;

pub use auto::AutoSyncService;
pub use dataset::DatasetContentAccess;
pub use member::MemberContentAccess;
pub use provider::{
    DirectDispatcher, Document, DocumentSyncProvider, EditorDispatcher, MemoryDocument,
    SyncProvider,
};
pub use registry::SynchronizerRegistry;
pub use spool::SpoolFileContentAccess;
pub use strategy::{
    AcceptRemote, AlwaysUpload, ConflictPrompt, DiffAwareStrategy, SaveStrategy, SyncMoment,
};
pub use synchronizer::RemoteContentSynchronizer;
pub use uss::UssFileContentAccess;

use crate::attributes::{EntityCategory, FileAttributes};
use crate::content::{Charset, ContentAdapter};
use crate::error::Result;
use crate::progress::ProgressIndicator;
use crate::vfs::FileHandle;
use bytes::Bytes;

pub trait ContentSynchronizer: Send + Sync {
    fn category(&self) -> EntityCategory;

    /// True when this synchronizer is responsible for `file`.
    fn accepts(&self, file: &FileHandle) -> bool;

    /// Bring local and remote content in line. Failures go to
    /// `SyncProvider::on_throwable`, success to `on_sync_success`.
    ///
    /// A call made while the same file is already being synchronized
    /// returns at once and invokes neither callback.
    fn synchronize_with_remote(
        &self,
        provider: &dyn SyncProvider,
        progress: Option<&dyn ProgressIndicator>,
    );

    /// Content of the last successful sync; empty if never fetched.
    fn successful_content_storage(&self, provider: &dyn SyncProvider) -> Bytes;

    fn is_file_upload_needed(&self, provider: &dyn SyncProvider) -> bool;

    /// Forget a pending local edit without uploading it.
    fn mark_as_not_needed_for_sync(&self, provider: &dyn SyncProvider);

    fn is_file_syncing_now(&self, file: &FileHandle) -> bool;
}

/// Category-specific remote side of a synchronizer.
pub trait RemoteContentAccess: Send + Sync {
    fn category(&self) -> EntityCategory;

    /// Extra filter on top of the category match.
    fn accepts_attributes(&self, _attributes: &FileAttributes) -> bool {
        true
    }

    /// Charset for a file synchronized for the first time.
    fn detect_encoding(
        &self,
        _file: &FileHandle,
        _attributes: &FileAttributes,
        _progress: Option<&dyn ProgressIndicator>,
    ) -> Charset {
        Charset::DEFAULT_TEXT
    }

    fn content_adapter(&self, attributes: &FileAttributes) -> Result<Box<dyn ContentAdapter>>;

    fn fetch_remote_content(
        &self,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Bytes>;

    fn upload_new_content(
        &self,
        attributes: &FileAttributes,
        content: &[u8],
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()>;
}
