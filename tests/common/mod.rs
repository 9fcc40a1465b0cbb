//! Scripted z/OSMF stand-in shared by the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use mfsync::api::{
    ApiResponse, BatchedList, DatasetInfo, DatasetOrganization, DsMask, JobInfo, JobsFilter,
    MemberInfo, Page, RemoteApi, SpoolFileInfo, UssEntry,
};
use mfsync::attributes::{
    AttributesService, DatasetAttributes, FileAttributes, RequestOrigin, Requester,
};
use mfsync::content::ContentMode;
use mfsync::{ConnectionConfig, FileHandle, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const URL: &str = "https://zos.example.com:443";

pub fn conn() -> ConnectionConfig {
    ConnectionConfig::new("conn-1", "dev", URL)
}

pub fn other_conn() -> ConnectionConfig {
    ConnectionConfig::new("conn-2", "backup", URL)
}

/// Text as it travels over the wire: one extra trailing newline.
pub fn wire(text: &str) -> Vec<u8> {
    format!("{text}\n").into_bytes()
}

const NOT_FOUND_BODY: &str =
    r#"{"category":1,"rc":4,"reason":13,"message":"Read failed","details":["EDC5129I No such file or directory."]}"#;

#[derive(Default)]
pub struct FakeZosmf {
    pub datasets: Mutex<Vec<DatasetInfo>>,
    pub members: Mutex<HashMap<String, Vec<MemberInfo>>>,
    pub contents: Mutex<HashMap<String, Vec<u8>>>,
    pub uss_dirs: Mutex<HashMap<String, Vec<UssEntry>>>,
    pub uss_tags: Mutex<HashMap<String, String>>,
    pub jobs: Mutex<Vec<JobInfo>>,
    pub spool_files: Mutex<HashMap<String, Vec<SpoolFileInfo>>>,
    /// Connections (by uuid) whose every call fails with 500.
    pub broken: Mutex<HashSet<String>>,
    /// Paths whose listing fails with 404 and a z/OSMF error body.
    pub missing: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeZosmf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_datasets(&self, names: &[&str]) {
        *self.datasets.lock().unwrap() = names
            .iter()
            .map(|n| {
                let mut info = DatasetInfo::new(*n);
                info.volser = Some("VOL001".into());
                info
            })
            .collect();
    }

    pub fn set_members(&self, library: &str, names: &[&str]) {
        self.members.lock().unwrap().insert(
            library.to_string(),
            names.iter().map(|n| MemberInfo::new(*n)).collect(),
        );
    }

    pub fn set_content(&self, key: &str, content: &[u8]) {
        self.contents
            .lock()
            .unwrap()
            .insert(key.to_string(), content.to_vec());
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().get(key).cloned()
    }

    pub fn break_connection(&self, conn: &ConnectionConfig) {
        self.broken.lock().unwrap().insert(conn.uuid.clone());
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_broken(&self, conn: &ConnectionConfig) -> bool {
        self.broken.lock().unwrap().contains(&conn.uuid)
    }

    fn read<T>(&self, conn: &ConnectionConfig, key: &str, wrap: impl FnOnce(Vec<u8>) -> T) -> ApiResponse<T> {
        if self.is_broken(conn) {
            return ApiResponse::failed(500, "Internal Server Error", None);
        }
        match self.content(key) {
            Some(content) => ApiResponse::ok(wrap(content)),
            None => ApiResponse::failed(404, "Not Found", Some(NOT_FOUND_BODY.to_string())),
        }
    }

    fn write(&self, conn: &ConnectionConfig, key: &str, content: Bytes) -> ApiResponse<()> {
        if self.is_broken(conn) {
            return ApiResponse::failed(500, "Internal Server Error", None);
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), content.to_vec()));
        self.set_content(key, &content);
        ApiResponse::ok(())
    }
}

/// Server-side paging: `start` is inclusive, `limit` caps the page.
fn page_of<T: Clone>(items: &[T], name: impl Fn(&T) -> &str, page: Page<'_>) -> BatchedList<T> {
    let from = page
        .start
        .and_then(|start| items.iter().position(|i| name(i) == start))
        .unwrap_or(0);
    let rest = &items[from..];
    let take = page.limit.unwrap_or(rest.len()).min(rest.len());
    BatchedList {
        items: rest[..take].to_vec(),
        total_rows: items.len(),
    }
}

fn mask_matches(mask: &str, name: &str) -> bool {
    match mask.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == mask,
    }
}

impl RemoteApi for FakeZosmf {
    fn list_datasets(
        &self,
        conn: &ConnectionConfig,
        mask: &DsMask,
        page: Page<'_>,
    ) -> Result<ApiResponse<BatchedList<DatasetInfo>>> {
        self.record(format!("list_datasets {} {:?} {:?}", mask.mask, page.start, page.limit));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        let mut all: Vec<DatasetInfo> = self
            .datasets
            .lock()
            .unwrap()
            .iter()
            .filter(|d| mask_matches(&mask.mask, &d.name))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ApiResponse::ok(page_of(&all, |d| d.name.as_str(), page)))
    }

    fn list_members(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        page: Page<'_>,
    ) -> Result<ApiResponse<BatchedList<MemberInfo>>> {
        self.record(format!("list_members {library} {:?} {:?}", page.start, page.limit));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        let all = self
            .members
            .lock()
            .unwrap()
            .get(library)
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::ok(page_of(&all, |m| m.name.as_str(), page)))
    }

    fn list_uss_path(&self, conn: &ConnectionConfig, path: &str) -> Result<ApiResponse<Vec<UssEntry>>> {
        self.record(format!("list_uss_path {path}"));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        if self.missing.lock().unwrap().contains(path) {
            return Ok(ApiResponse::failed(404, "Not Found", Some(NOT_FOUND_BODY.to_string())));
        }
        Ok(ApiResponse::ok(
            self.uss_dirs.lock().unwrap().get(path).cloned().unwrap_or_default(),
        ))
    }

    fn list_jobs(&self, conn: &ConnectionConfig, filter: &JobsFilter) -> Result<ApiResponse<Vec<JobInfo>>> {
        self.record(format!("list_jobs {filter:?}"));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        Ok(ApiResponse::ok(self.jobs.lock().unwrap().clone()))
    }

    fn list_spool_files(
        &self,
        conn: &ConnectionConfig,
        job_name: &str,
        job_id: &str,
    ) -> Result<ApiResponse<Vec<SpoolFileInfo>>> {
        self.record(format!("list_spool_files {job_name}/{job_id}"));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        Ok(ApiResponse::ok(
            self.spool_files.lock().unwrap().get(job_id).cloned().unwrap_or_default(),
        ))
    }

    fn retrieve_dataset_content(
        &self,
        conn: &ConnectionConfig,
        dataset: &str,
        _volser: Option<&str>,
        _mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>> {
        self.record(format!("retrieve_dataset {dataset} via {}", conn.uuid));
        Ok(self.read(conn, dataset, Bytes::from))
    }

    fn write_dataset_content(
        &self,
        conn: &ConnectionConfig,
        dataset: &str,
        _volser: Option<&str>,
        _mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>> {
        self.record(format!("write_dataset {dataset} via {}", conn.uuid));
        Ok(self.write(conn, dataset, content))
    }

    fn retrieve_member_content(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        member: &str,
        _mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>> {
        let key = format!("{library}({member})");
        self.record(format!("retrieve_member {key} via {}", conn.uuid));
        Ok(self.read(conn, &key, Bytes::from))
    }

    fn write_member_content(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        member: &str,
        _mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>> {
        let key = format!("{library}({member})");
        self.record(format!("write_member {key} via {}", conn.uuid));
        Ok(self.write(conn, &key, content))
    }

    fn retrieve_uss_file_content(
        &self,
        conn: &ConnectionConfig,
        path: &str,
        _mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>> {
        self.record(format!("retrieve_uss {path} via {}", conn.uuid));
        Ok(self.read(conn, path, Bytes::from))
    }

    fn write_uss_file_content(
        &self,
        conn: &ConnectionConfig,
        path: &str,
        _mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>> {
        self.record(format!("write_uss {path} via {}", conn.uuid));
        Ok(self.write(conn, path, content))
    }

    fn retrieve_spool_file_content(
        &self,
        conn: &ConnectionConfig,
        job_name: &str,
        job_id: &str,
        spool_id: u32,
    ) -> Result<ApiResponse<Bytes>> {
        let key = format!("{job_name}/{job_id}/{spool_id}");
        self.record(format!("retrieve_spool {key}"));
        Ok(self.read(conn, &key, Bytes::from))
    }

    fn list_uss_file_tag(&self, conn: &ConnectionConfig, path: &str) -> Result<ApiResponse<String>> {
        self.record(format!("list_uss_file_tag {path}"));
        if self.is_broken(conn) {
            return Ok(ApiResponse::failed(500, "Internal Server Error", None));
        }
        let tag = self
            .uss_tags
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| format!("- untagged    T=off {path}"));
        Ok(ApiResponse::ok(tag))
    }
}

/// Register a partitioned dataset reachable through `requesters`.
pub fn register_library(
    attributes: &dyn AttributesService,
    name: &str,
    requesters: &[ConnectionConfig],
) -> FileHandle {
    let mut info = DatasetInfo::new(name);
    info.volser = Some("VOL001".into());
    info.organization = Some(DatasetOrganization::Partitioned);
    let requesters = requesters
        .iter()
        .map(|c| Requester::new(c.clone(), RequestOrigin::DatasetMask(DsMask::new(name))))
        .collect();
    attributes
        .get_or_create_virtual_file(FileAttributes::Dataset(DatasetAttributes::new(
            info, URL, requesters,
        )))
        .unwrap()
}
