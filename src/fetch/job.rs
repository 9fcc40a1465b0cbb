//! Job listings by owner, prefix or id.

use crate::api::{JobsFilter, RemoteApi};
use crate::attributes::{
    AttributesService, EntityCategory, FileAttributes, JobAttributes, RequestOrigin, Requester,
};
use crate::error::{response_message_map, Result};
use crate::fetch::{job_log, prune_requesters, FetchSource, RemoteQuery};
use crate::progress::{self, ProgressIndicator};
use crate::vfs::{FileHandle, FileSystem};
use std::sync::Arc;
use tracing::info;

pub struct JobFetch {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
    fs: Arc<dyn FileSystem>,
}

impl JobFetch {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        attributes: Arc<dyn AttributesService>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { api, attributes, fs }
    }
}

impl FetchSource for JobFetch {
    type Request = JobsFilter;

    fn category(&self) -> EntityCategory {
        EntityCategory::Job
    }

    fn fetch(
        &self,
        query: &RemoteQuery<JobsFilter>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<FileAttributes>> {
        info!(filter = ?query.request, "listing jobs");
        progress::check_cancelled(progress)?;
        let response = self.api.list_jobs(&query.connection, &query.request)?;
        let head = response_message_map(&response.reason).unwrap_or("Cannot retrieve Job files list");
        let mut jobs = response.into_body(head)?;
        progress::check_cancelled(progress)?;

        if jobs.first().is_some_and(|job| !job.has_exec_timestamps()) {
            progress::set_text(progress, "Reading job logs");
            jobs = job_log::fill_exec_timestamps(self.api.as_ref(), &query.connection, jobs);
            progress::check_cancelled(progress)?;
        }
        info!(filter = ?query.request, count = jobs.len(), "jobs listed");

        let requester = Requester::new(
            query.connection.clone(),
            RequestOrigin::Jobs(query.request.clone()),
        );
        Ok(jobs
            .into_iter()
            .map(|job| {
                FileAttributes::Job(JobAttributes::new(
                    job,
                    query.connection.url.clone(),
                    vec![requester.clone()],
                ))
            })
            .collect())
    }

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<JobsFilter>) {
        prune_requesters(self.attributes.as_ref(), self.fs.as_ref(), file, |r| {
            r.connection == query.connection
        });
    }
}
