//! Boundary to the z/OSMF REST client.
//!
//! The HTTP bindings live outside this crate. Everything here is the shape the
//! core consumes: listing records, content transfer and the response envelope.
//! Transport failures come back as `Err`; HTTP failures come back as an
//! `ApiResponse` with a non-2xx status and the raw error body.

use crate::connection::ConnectionConfig;
use crate::content::ContentMode;
use crate::error::{CallError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// =============================================================================
// Response envelope
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub reason: String,
    pub body: Option<T>,
    pub error_body: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            body: Some(body),
            error_body: None,
        }
    }

    pub fn failed(status: u16, reason: impl Into<String>, error_body: Option<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: None,
            error_body,
        }
    }

    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Unwrap a successful body or turn the failure into a `CallError`.
    ///
    /// A 2xx without a body is treated as a failure too; every call the core
    /// makes expects one.
    pub fn into_body(self, head_message: &str) -> Result<T> {
        if !self.is_successful() {
            return Err(CallError::from_response(&self, head_message).into());
        }
        match self.body {
            Some(body) => Ok(body),
            None => Err(CallError::new(self.status, self.reason, head_message).into()),
        }
    }
}

// =============================================================================
// Datasets and members
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetOrganization {
    #[serde(rename = "PS")]
    Sequential,
    #[serde(rename = "PO")]
    Partitioned,
    #[serde(rename = "PO-E")]
    PartitionedExtended,
    #[serde(rename = "VS")]
    Vsam,
    #[serde(rename = "DA")]
    Direct,
}

impl DatasetOrganization {
    pub fn is_library(self) -> bool {
        matches!(self, Self::Partitioned | Self::PartitionedExtended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordFormat {
    F,
    FB,
    V,
    VB,
    U,
    FBA,
    VBA,
}

/// Volume serial z/OSMF reports for migrated datasets.
pub const MIGRATED_VOLSER: &str = "MIGRAT";
/// Volume serial z/OSMF reports for alias entries.
pub const ALIAS_VOLSER: &str = "*ALIAS";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    #[serde(default)]
    pub volser: Option<String>,
    #[serde(default)]
    pub organization: Option<DatasetOrganization>,
    #[serde(default)]
    pub record_format: Option<RecordFormat>,
    #[serde(default)]
    pub record_length: Option<u32>,
    #[serde(default)]
    pub block_size: Option<u32>,
}

impl DatasetInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volser: None,
            organization: Some(DatasetOrganization::Sequential),
            record_format: None,
            record_length: None,
            block_size: None,
        }
    }

    pub fn is_migrated(&self) -> bool {
        self.volser.as_deref() == Some(MIGRATED_VOLSER)
    }

    pub fn is_alias(&self) -> bool {
        self.volser.as_deref() == Some(ALIAS_VOLSER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub changed: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            changed: None,
            user: None,
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchedList<T> {
    pub items: Vec<T>,
    /// Total number of rows matching the request, across all pages.
    pub total_rows: usize,
}

// =============================================================================
// USS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UssEntry {
    pub name: String,
    /// Symbolic mode as printed by `ls -l`, e.g. `drwxr-xr-x`.
    pub mode: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mtime: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl UssEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: "-rw-r--r--".to_string(),
            size: 0,
            user: None,
            group: None,
            mtime: None,
            target: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            mode: "drwxr-xr-x".to_string(),
            ..Self::file(name)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.mode.starts_with('d')
    }

    pub fn is_symlink(&self) -> bool {
        self.mode.starts_with('l')
    }

    pub fn is_writable_by_owner(&self) -> bool {
        self.mode.as_bytes().get(2) == Some(&b'w')
    }
}

// =============================================================================
// Jobs and spool files
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobsFilter {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub user_correlator: Option<String>,
}

impl JobsFilter {
    pub fn by_owner_and_prefix(owner: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub job_name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub return_code: Option<String>,
    #[serde(default)]
    pub exec_submitted: Option<String>,
    #[serde(default)]
    pub exec_started: Option<String>,
    #[serde(default)]
    pub exec_ended: Option<String>,
}

impl JobInfo {
    pub fn new(job_id: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            owner: None,
            status: None,
            return_code: None,
            exec_submitted: None,
            exec_started: None,
            exec_ended: None,
        }
    }

    pub fn has_exec_timestamps(&self) -> bool {
        self.exec_started.is_some() || self.exec_ended.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpoolFileInfo {
    pub id: u32,
    pub dd_name: String,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub proc_step: Option<String>,
    #[serde(default)]
    pub record_count: u64,
}

impl SpoolFileInfo {
    pub fn new(id: u32, dd_name: impl Into<String>) -> Self {
        Self {
            id,
            dd_name: dd_name.into(),
            step_name: None,
            proc_step: None,
            record_count: 0,
        }
    }
}

/// Spool file holding the JES message log of every job.
pub const JESMSGLG_SPOOL_ID: u32 = 1;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DsMask {
    pub mask: String,
    #[serde(default)]
    pub volser: Option<String>,
}

impl DsMask {
    pub fn new(mask: impl Into<String>) -> Self {
        Self {
            mask: mask.into().to_uppercase(),
            volser: None,
        }
    }

    pub fn on_volume(mask: impl Into<String>, volser: impl Into<String>) -> Self {
        Self {
            mask: mask.into().to_uppercase(),
            volser: Some(volser.into().to_uppercase()),
        }
    }
}

/// Page window passed to listing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a> {
    /// Name of the last item already seen; the server lists from it inclusive.
    pub start: Option<&'a str>,
    pub limit: Option<usize>,
}

impl Page<'static> {
    pub const UNBOUNDED: Self = Page {
        start: None,
        limit: None,
    };
}

// =============================================================================
// RemoteApi
// =============================================================================

/// Blocking z/OSMF operations the core depends on.
///
/// Implementations must be shareable across worker threads.
pub trait RemoteApi: Send + Sync {
    fn list_datasets(
        &self,
        conn: &ConnectionConfig,
        mask: &DsMask,
        page: Page<'_>,
    ) -> Result<ApiResponse<BatchedList<DatasetInfo>>>;

    fn list_members(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        page: Page<'_>,
    ) -> Result<ApiResponse<BatchedList<MemberInfo>>>;

    fn list_uss_path(&self, conn: &ConnectionConfig, path: &str)
        -> Result<ApiResponse<Vec<UssEntry>>>;

    fn list_jobs(&self, conn: &ConnectionConfig, filter: &JobsFilter)
        -> Result<ApiResponse<Vec<JobInfo>>>;

    fn list_spool_files(
        &self,
        conn: &ConnectionConfig,
        job_name: &str,
        job_id: &str,
    ) -> Result<ApiResponse<Vec<SpoolFileInfo>>>;

    fn retrieve_dataset_content(
        &self,
        conn: &ConnectionConfig,
        dataset: &str,
        volser: Option<&str>,
        mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>>;

    fn write_dataset_content(
        &self,
        conn: &ConnectionConfig,
        dataset: &str,
        volser: Option<&str>,
        mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>>;

    fn retrieve_member_content(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        member: &str,
        mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>>;

    fn write_member_content(
        &self,
        conn: &ConnectionConfig,
        library: &str,
        member: &str,
        mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>>;

    fn retrieve_uss_file_content(
        &self,
        conn: &ConnectionConfig,
        path: &str,
        mode: ContentMode,
    ) -> Result<ApiResponse<Bytes>>;

    fn write_uss_file_content(
        &self,
        conn: &ConnectionConfig,
        path: &str,
        mode: ContentMode,
        content: Bytes,
    ) -> Result<ApiResponse<()>>;

    fn retrieve_spool_file_content(
        &self,
        conn: &ConnectionConfig,
        job_name: &str,
        job_id: &str,
        spool_id: u32,
    ) -> Result<ApiResponse<Bytes>>;

    /// `chtag -p` output for a USS file, e.g. `t IBM-1047    T=on  /u/file`.
    fn list_uss_file_tag(&self, conn: &ConnectionConfig, path: &str)
        -> Result<ApiResponse<String>>;
}
