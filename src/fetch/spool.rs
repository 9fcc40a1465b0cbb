//! Spool files of a job.

use crate::api::RemoteApi;
use crate::attributes::{AttributesService, EntityCategory, FileAttributes, SpoolFileAttributes};
use crate::error::{Result, SyncError};
use crate::fetch::{delete_file, FetchSource, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use std::sync::Arc;
use tracing::info;

/// Spool files of the job behind `job`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobQuery {
    pub job: FileHandle,
}

impl JobQuery {
    pub fn new(job: FileHandle) -> Self {
        Self { job }
    }
}

pub struct SpoolFetch {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
}

impl SpoolFetch {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        attributes: Arc<dyn AttributesService>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { api, attributes, fs }
    }
}

impl FetchSource for SpoolFetch {
    type Request = JobQuery;

    fn category(&self) -> EntityCategory {
        EntityCategory::SpoolFile
    }

    fn fetch(
        &self,
        query: &RemoteQuery<JobQuery>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<FileAttributes>> {
        let job = self
            .attributes
            .get_attributes(&query.request.job)
            .and_then(|a| a.as_job().map(|j| j.info.clone()))
            .ok_or_else(|| SyncError::InvalidQuery(format!("{} is not a job", query.request.job)))?;

        info!(job = %job.job_id, name = %job.job_name, "listing spool files");
        progress::check_cancelled(progress)?;
        let spool_files = self
            .api
            .list_spool_files(&query.connection, &job.job_name, &job.job_id)?
            .into_body("Cannot retrieve Job files list")?;
        progress::check_cancelled(progress)?;
        info!(job = %job.job_id, count = spool_files.len(), "spool files listed");

        Ok(spool_files
            .into_iter()
            .map(|info| {
                FileAttributes::SpoolFile(SpoolFileAttributes::new(info, query.request.job.clone()))
            })
            .collect())
    }

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<JobQuery>) {
        info!(%file, job = %query.request.job, "cleaning up spool file");
        delete_file(self.attributes.as_ref(), self.fs.as_ref(), file);
    }
}
