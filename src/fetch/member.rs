//! Member listings of a library.

use crate::api::{ApiResponse, BatchedList, MemberInfo, Page, RemoteApi};
use crate::attributes::{AttributesService, EntityCategory, FileAttributes, MemberAttributes};
use crate::error::{Result, SyncError};
use crate::fetch::{delete_file, BatchedSource, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use std::sync::Arc;
use tracing::info;

/// Members of the library behind `library`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryQuery {
    pub library: FileHandle,
}

impl LibraryQuery {
    pub fn new(library: FileHandle) -> Self {
        Self { library }
    }
}

pub struct MemberFetch {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
}

impl MemberFetch {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        attributes: Arc<dyn AttributesService>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { api, attributes, fs }
    }

    fn library_name(&self, library: &FileHandle) -> Result<String> {
        self.attributes
            .get_attributes(library)
            .and_then(|a| a.as_dataset().map(|d| d.info.name.clone()))
            .ok_or_else(|| SyncError::InvalidQuery(format!("{library} is not a library")))
    }
}

impl BatchedSource for MemberFetch {
    type Request = LibraryQuery;
    type Item = MemberInfo;

    fn category(&self) -> EntityCategory {
        EntityCategory::Member
    }

    fn default_error_message(&self) -> &'static str {
        "Cannot retrieve member list"
    }

    fn fetch_batch(
        &self,
        query: &RemoteQuery<LibraryQuery>,
        page: Page<'_>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<ApiResponse<BatchedList<MemberInfo>>> {
        if !self.fs.is_valid(&query.request.library) {
            info!(library = %query.request.library, "library is gone, nothing to list");
            return Ok(ApiResponse::ok(BatchedList {
                items: Vec::new(),
                total_rows: 0,
            }));
        }
        let library = self.library_name(&query.request.library)?;
        progress::check_cancelled(progress)?;
        info!(%library, start = ?page.start, "listing members");
        let response = self.api.list_members(&query.connection, &library, page)?;
        progress::check_cancelled(progress)?;
        Ok(response)
    }

    fn item_name(item: &MemberInfo) -> &str {
        &item.name
    }

    fn build_attributes(
        &self,
        query: &RemoteQuery<LibraryQuery>,
        item: MemberInfo,
    ) -> Result<FileAttributes> {
        Ok(FileAttributes::Member(MemberAttributes::new(
            item,
            query.request.library.clone(),
        )))
    }

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<LibraryQuery>) {
        info!(%file, library = %query.request.library, "cleaning up member");
        delete_file(self.attributes.as_ref(), self.fs.as_ref(), file);
    }
}
