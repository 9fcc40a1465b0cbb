//! Dataset listings by mask.

use crate::api::{ApiResponse, BatchedList, DatasetInfo, DsMask, Page, RemoteApi};
use crate::attributes::{
    AttributesService, DatasetAttributes, EntityCategory, FileAttributes, RequestOrigin, Requester,
};
use crate::error::Result;
use crate::fetch::{prune_requesters, BatchedSource, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use std::sync::Arc;
use tracing::info;

pub struct DatasetFetch {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
}

impl DatasetFetch {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        attributes: Arc<dyn AttributesService>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { api, attributes, fs }
    }
}

impl BatchedSource for DatasetFetch {
    type Request = DsMask;
    type Item = DatasetInfo;

    fn category(&self) -> EntityCategory {
        EntityCategory::Dataset
    }

    fn default_error_message(&self) -> &'static str {
        "Cannot retrieve dataset list"
    }

    fn fetch_batch(
        &self,
        query: &RemoteQuery<DsMask>,
        page: Page<'_>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<ApiResponse<BatchedList<DatasetInfo>>> {
        progress::check_cancelled(progress)?;
        info!(mask = %query.request.mask, volser = ?query.request.volser, start = ?page.start, "listing datasets");
        let response = self.api.list_datasets(&query.connection, &query.request, page)?;
        progress::check_cancelled(progress)?;
        Ok(response)
    }

    fn item_name(item: &DatasetInfo) -> &str {
        &item.name
    }

    fn build_attributes(
        &self,
        query: &RemoteQuery<DsMask>,
        item: DatasetInfo,
    ) -> Result<FileAttributes> {
        let requester = Requester::new(
            query.connection.clone(),
            RequestOrigin::DatasetMask(query.request.clone()),
        );
        Ok(FileAttributes::Dataset(DatasetAttributes::new(
            item,
            query.connection.url.clone(),
            vec![requester],
        )))
    }

    /// The same dataset can be listed by several masks; only the requesters
    /// of this connection and volume go away unless nothing else is left.
    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<DsMask>) {
        prune_requesters(self.attributes.as_ref(), self.fs.as_ref(), file, |r| {
            r.connection == query.connection
                && matches!(&r.origin, RequestOrigin::DatasetMask(mask) if mask.volser == query.request.volser)
        });
    }
}
