//! USS directory listings.

use crate::api::RemoteApi;
use crate::attributes::{
    AttributesService, EntityCategory, FileAttributes, RequestOrigin, Requester, UssAttributes,
};
use crate::error::{response_message_map, Result};
use crate::fetch::{delete_file, FetchSource, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use std::sync::Arc;
use tracing::{debug, info};

const UPPER_DIR_NAME: &str = "..";

/// Contents of the directory at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UssQuery {
    pub path: String,
}

impl UssQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

pub struct UssFetch {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
}

impl UssFetch {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        attributes: Arc<dyn AttributesService>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { api, attributes, fs }
    }
}

impl FetchSource for UssFetch {
    type Request = UssQuery;

    fn category(&self) -> EntityCategory {
        EntityCategory::UssFile
    }

    fn fetch(
        &self,
        query: &RemoteQuery<UssQuery>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<FileAttributes>> {
        info!(path = %query.request.path, "listing USS path");
        progress::check_cancelled(progress)?;
        let response = self.api.list_uss_path(&query.connection, &query.request.path)?;
        let head = response_message_map(&response.reason).unwrap_or("Cannot retrieve USS files list");
        let entries = response.into_body(head)?;
        progress::check_cancelled(progress)?;

        let requester = Requester::new(
            query.connection.clone(),
            RequestOrigin::UssPath(query.request.path.clone()),
        );
        let attributes: Vec<FileAttributes> = entries
            .into_iter()
            .filter(|entry| entry.name != UPPER_DIR_NAME)
            .map(|entry| {
                FileAttributes::UssFile(UssAttributes::new(
                    &query.request.path,
                    entry,
                    query.connection.url.clone(),
                    vec![requester.clone()],
                ))
            })
            .collect();
        debug!(path = %query.request.path, count = attributes.len(), "USS path listed");
        Ok(attributes)
    }

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<UssQuery>) {
        info!(%file, path = %query.request.path, "cleaning up USS file");
        delete_file(self.attributes.as_ref(), self.fs.as_ref(), file);
    }
}
