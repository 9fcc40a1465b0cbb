//! Sequential dataset content.

use crate::api::RemoteApi;
use crate::attributes::{DatasetAttributes, EntityCategory, FileAttributes};
use crate::content::{self, ContentAdapter};
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressIndicator};
use crate::sync::requesters::first_successful;
use crate::sync::RemoteContentAccess;
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

pub struct DatasetContentAccess {
    api: Arc<dyn RemoteApi>,
}

impl DatasetContentAccess {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }

    fn dataset<'a>(&self, attributes: &'a FileAttributes) -> Result<&'a DatasetAttributes> {
        attributes
            .as_dataset()
            .ok_or_else(|| SyncError::NoAttributes(attributes.name().to_string()))
    }
}

impl RemoteContentAccess for DatasetContentAccess {
    fn category(&self) -> EntityCategory {
        EntityCategory::Dataset
    }

    fn accepts_attributes(&self, attributes: &FileAttributes) -> bool {
        attributes
            .as_dataset()
            .is_some_and(DatasetAttributes::is_editable_sequential)
    }

    fn content_adapter(&self, attributes: &FileAttributes) -> Result<Box<dyn ContentAdapter>> {
        let dataset = self.dataset(attributes)?;
        Ok(content::adapter_for(dataset.content_mode, dataset.record_layout()))
    }

    fn fetch_remote_content(
        &self,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Bytes> {
        let dataset = self.dataset(attributes)?;
        info!(dataset = %dataset.info.name, "fetching remote content");
        let head = format!("Cannot fetch data from {}", dataset.info.name);
        first_successful(&dataset.requesters, &dataset.info.name, progress, |requester| {
            let body = self
                .api
                .retrieve_dataset_content(
                    &requester.connection,
                    &dataset.info.name,
                    dataset.info.volser.as_deref(),
                    dataset.content_mode,
                )?
                .into_body(&head)?;
            progress::check_cancelled(progress)?;
            Ok(content::from_transfer(dataset.content_mode, body))
        })
    }

    fn upload_new_content(
        &self,
        attributes: &FileAttributes,
        new_content: &[u8],
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()> {
        let dataset = self.dataset(attributes)?;
        info!(dataset = %dataset.info.name, "uploading new content");
        let head = format!("Cannot upload data to {}", dataset.info.name);
        let payload = content::to_transfer(dataset.content_mode, new_content);
        first_successful(&dataset.requesters, &dataset.info.name, progress, |requester| {
            self.api
                .write_dataset_content(
                    &requester.connection,
                    &dataset.info.name,
                    dataset.info.volser.as_deref(),
                    dataset.content_mode,
                    payload.clone(),
                )?
                .into_body(&head)
        })
    }
}
