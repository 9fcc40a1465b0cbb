//! Spool file content. Read-only: uploads are ignored.

use crate::api::RemoteApi;
use crate::attributes::{
    AttributesService, EntityCategory, FileAttributes, JobAttributes, SpoolFileAttributes,
};
use crate::content::{self, ContentAdapter};
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressIndicator};
use crate::sync::requesters::first_successful;
use crate::sync::RemoteContentAccess;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SpoolFileContentAccess {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
}

impl SpoolFileContentAccess {
    pub fn new(api: Arc<dyn RemoteApi>, attributes: Arc<dyn AttributesService>) -> Self {
        Self { api, attributes }
    }

    fn resolve<'a>(
        &self,
        attributes: &'a FileAttributes,
    ) -> Result<(&'a SpoolFileAttributes, JobAttributes)> {
        let spool = attributes
            .as_spool_file()
            .ok_or_else(|| SyncError::NoAttributes(attributes.name().to_string()))?;
        let job = self
            .attributes
            .get_attributes(&spool.parent)
            .and_then(|parent| parent.as_job().cloned())
            .ok_or_else(|| SyncError::ParentAttributesNotFound {
                kind: "job",
                path: spool.parent.path().to_string(),
            })?;
        Ok((spool, job))
    }
}

impl RemoteContentAccess for SpoolFileContentAccess {
    fn category(&self) -> EntityCategory {
        EntityCategory::SpoolFile
    }

    fn content_adapter(&self, attributes: &FileAttributes) -> Result<Box<dyn ContentAdapter>> {
        Ok(content::adapter_for(attributes.content_mode(), None))
    }

    fn fetch_remote_content(
        &self,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Bytes> {
        let (spool, job) = self.resolve(attributes)?;
        let target = format!("{}/{}/{}", job.info.job_name, job.info.job_id, spool.info.dd_name);
        info!(spool = %target, "fetching spool file content");
        let head = format!("Cannot fetch data from {target}");
        first_successful(&job.requesters, &target, progress, |requester| {
            let body = self
                .api
                .retrieve_spool_file_content(
                    &requester.connection,
                    &job.info.job_name,
                    &job.info.job_id,
                    spool.info.id,
                )?
                .into_body(&head)?;
            progress::check_cancelled(progress)?;
            Ok(body)
        })
    }

    fn upload_new_content(
        &self,
        attributes: &FileAttributes,
        _new_content: &[u8],
        _progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()> {
        warn!(spool = %attributes.name(), "spool files are read-only, upload skipped");
        Ok(())
    }
}
