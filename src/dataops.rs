//! Wiring of every component around one remote API.
//!
//! `DataOps` owns the event bus, the attributes registry, one synchronizer
//! and one fetch provider per category, and the auto-sync service. Listeners
//! are subscribed in a fixed order: the attributes registry first, then the
//! synchronizers, then auto-sync, so a queued sync already sees the edit flag
//! its `ContentChanged` event set.

use crate::api::RemoteApi;
use crate::attributes::{AttributesRegistry, AttributesService};
use crate::config::Config;
use crate::error::Result;
use crate::events::FileEventBus;
use crate::fetch::{
    BatchedFetch, DatasetFetch, JobFetch, MemberFetch, RemoteFileFetchProvider, SpoolFetch,
    UssFetch,
};
use crate::sync::auto::SyncRejection;
use crate::sync::synchronizer::storage_name;
use crate::sync::{
    AutoSyncService, ContentSynchronizer, DatasetContentAccess, MemberContentAccess,
    RemoteContentAccess, RemoteContentSynchronizer, SpoolFileContentAccess, SyncProvider,
    SynchronizerRegistry, UssFileContentAccess,
};
use crate::vfs::{FileHandle, FileSystem, MemoryFileSystem};
use std::sync::Arc;
use tracing::info;

pub type DatasetFetchProvider = RemoteFileFetchProvider<BatchedFetch<DatasetFetch>>;
pub type MemberFetchProvider = RemoteFileFetchProvider<BatchedFetch<MemberFetch>>;
pub type UssFetchProvider = RemoteFileFetchProvider<UssFetch>;
pub type JobFetchProvider = RemoteFileFetchProvider<JobFetch>;
pub type SpoolFetchProvider = RemoteFileFetchProvider<SpoolFetch>;

pub struct DataOps {
    config: Config,
    events: Arc<FileEventBus>,
    fs: Arc<dyn FileSystem>,
    attributes: Arc<AttributesRegistry>,
    synchronizers: SynchronizerRegistry,
    auto_sync: AutoSyncService,
    datasets: Arc<DatasetFetchProvider>,
    members: Arc<MemberFetchProvider>,
    uss: Arc<UssFetchProvider>,
    jobs: Arc<JobFetchProvider>,
    spool_files: Arc<SpoolFetchProvider>,
}

impl DataOps {
    /// Build everything on top of an in-memory virtual file system.
    pub fn new(config: Config, api: Arc<dyn RemoteApi>) -> Result<Self> {
        let events = Arc::new(FileEventBus::new());
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new(Arc::clone(&events)));
        Self::with_file_system(config, api, events, fs)
    }

    /// Build everything on top of `fs`, which must publish its deletions on
    /// `events`.
    pub fn with_file_system(
        config: Config,
        api: Arc<dyn RemoteApi>,
        events: Arc<FileEventBus>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        config.validate()?;

        let attributes = Arc::new(AttributesRegistry::new(Arc::clone(&fs)));
        events.subscribe(attributes.clone());
        let service: Arc<dyn AttributesService> = attributes.clone();

        let mut synchronizers = SynchronizerRegistry::new();
        synchronizers.register(synchronizer(
            &config,
            DatasetContentAccess::new(Arc::clone(&api)),
            &service,
            &events,
        )?);
        synchronizers.register(synchronizer(
            &config,
            MemberContentAccess::new(Arc::clone(&api), Arc::clone(&service)),
            &service,
            &events,
        )?);
        synchronizers.register(synchronizer(
            &config,
            UssFileContentAccess::new(Arc::clone(&api), Arc::clone(&service)),
            &service,
            &events,
        )?);
        synchronizers.register(synchronizer(
            &config,
            SpoolFileContentAccess::new(Arc::clone(&api), Arc::clone(&service)),
            &service,
            &events,
        )?);

        let auto_sync = AutoSyncService::new(
            synchronizers.clone(),
            Arc::clone(&fs),
            config.auto_sync,
            config.throttle(),
        );
        events.subscribe(auto_sync.listener());

        let batch_size = config.batch_size;
        let datasets = Arc::new(RemoteFileFetchProvider::new(
            BatchedFetch::new(
                DatasetFetch::new(Arc::clone(&api), Arc::clone(&service), Arc::clone(&fs)),
                batch_size,
            ),
            Arc::clone(&service),
            Arc::clone(&fs),
        ));
        let members = Arc::new(RemoteFileFetchProvider::new(
            BatchedFetch::new(
                MemberFetch::new(Arc::clone(&api), Arc::clone(&service), Arc::clone(&fs)),
                batch_size,
            ),
            Arc::clone(&service),
            Arc::clone(&fs),
        ));
        let uss = Arc::new(RemoteFileFetchProvider::new(
            UssFetch::new(Arc::clone(&api), Arc::clone(&service), Arc::clone(&fs)),
            Arc::clone(&service),
            Arc::clone(&fs),
        ));
        let jobs = Arc::new(RemoteFileFetchProvider::new(
            JobFetch::new(Arc::clone(&api), Arc::clone(&service), Arc::clone(&fs)),
            Arc::clone(&service),
            Arc::clone(&fs),
        ));
        let spool_files = Arc::new(RemoteFileFetchProvider::new(
            SpoolFetch::new(Arc::clone(&api), Arc::clone(&service), Arc::clone(&fs)),
            Arc::clone(&service),
            Arc::clone(&fs),
        ));

        info!(
            synchronizers = synchronizers.len(),
            auto_sync = config.auto_sync,
            batch_size,
            "data operations ready"
        );
        Ok(Self {
            config,
            events,
            fs,
            attributes,
            synchronizers,
            auto_sync,
            datasets,
            members,
            uss,
            jobs,
            spool_files,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<FileEventBus> {
        &self.events
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn attributes(&self) -> &Arc<AttributesRegistry> {
        &self.attributes
    }

    pub fn synchronizers(&self) -> &SynchronizerRegistry {
        &self.synchronizers
    }

    pub fn synchronizer_for(&self, file: &FileHandle) -> Option<Arc<dyn ContentSynchronizer>> {
        self.synchronizers.find(file)
    }

    pub fn auto_sync(&self) -> &AutoSyncService {
        &self.auto_sync
    }

    pub fn datasets(&self) -> &Arc<DatasetFetchProvider> {
        &self.datasets
    }

    pub fn members(&self) -> &Arc<MemberFetchProvider> {
        &self.members
    }

    pub fn uss(&self) -> &Arc<UssFetchProvider> {
        &self.uss
    }

    pub fn jobs(&self) -> &Arc<JobFetchProvider> {
        &self.jobs
    }

    pub fn spool_files(&self) -> &Arc<SpoolFetchProvider> {
        &self.spool_files
    }

    /// Hand an opened document over to background synchronization.
    pub fn start_sync(&self, provider: Arc<dyn SyncProvider>) -> std::result::Result<(), SyncRejection> {
        self.auto_sync.start_sync(provider)
    }

    /// Report a local edit of `file`.
    pub fn content_changed(&self, file: &FileHandle) {
        self.events.content_changed(file);
    }

    pub fn shutdown(&self) {
        self.auto_sync.shutdown();
    }
}

impl Drop for DataOps {
    fn drop(&mut self) {
        self.auto_sync.shutdown();
    }
}

fn synchronizer<A: RemoteContentAccess + 'static>(
    config: &Config,
    access: A,
    attributes: &Arc<dyn AttributesService>,
    events: &FileEventBus,
) -> Result<Arc<dyn ContentSynchronizer>> {
    let storage = config.open_storage(&storage_name(access.category()))?;
    Ok(Arc::new(RemoteContentSynchronizer::new(
        access,
        Arc::clone(attributes),
        storage,
        events,
    )))
}
