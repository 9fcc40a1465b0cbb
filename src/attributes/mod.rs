//! Remote metadata attached to virtual file handles.
//!
//! Each remote entity category has its own record type, collected in the
//! closed `FileAttributes` enum. Records rooted at a connection carry the
//! requesters that discovered them; dependent records (members, spool files)
//! name their parent by handle and are resolved through the service.

pub mod registry;

pub use registry::AttributesRegistry;

use crate::api::{DatasetInfo, DsMask, JobInfo, JobsFilter, MemberInfo, SpoolFileInfo, UssEntry};
use crate::connection::{trim_url, ConnectionConfig};
use crate::content::{Charset, ContentMode, RecordLayout};
use crate::vfs::{FileHandle, FileKind};
use std::fmt;

// =============================================================================
// Requesters
// =============================================================================

/// The listing a requester came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestOrigin {
    DatasetMask(DsMask),
    Library(FileHandle),
    UssPath(String),
    Jobs(JobsFilter),
    Job(FileHandle),
}

/// A connection plus the query through which a file was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requester {
    pub connection: ConnectionConfig,
    pub origin: RequestOrigin,
}

impl Requester {
    pub fn new(connection: ConnectionConfig, origin: RequestOrigin) -> Self {
        Self { connection, origin }
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {:?}", self.connection.name, self.origin)
    }
}

/// Append requesters from `incoming` that `current` does not hold yet.
pub fn merge_requesters(current: &mut Vec<Requester>, incoming: Vec<Requester>) {
    for requester in incoming {
        if !current.contains(&requester) {
            current.push(requester);
        }
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Dataset,
    Member,
    UssFile,
    SpoolFile,
    Job,
}

impl EntityCategory {
    /// Plural name, used for storage names and messages.
    pub fn entity_name(self) -> &'static str {
        match self {
            EntityCategory::Dataset => "datasets",
            EntityCategory::Member => "members",
            EntityCategory::UssFile => "uss_files",
            EntityCategory::SpoolFile => "spool_files",
            EntityCategory::Job => "jobs",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAttributes {
    pub info: DatasetInfo,
    pub url: String,
    pub requesters: Vec<Requester>,
    pub content_mode: ContentMode,
}

impl DatasetAttributes {
    pub fn new(info: DatasetInfo, url: impl Into<String>, requesters: Vec<Requester>) -> Self {
        Self {
            info,
            url: url.into(),
            requesters,
            content_mode: ContentMode::Text,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.info.organization.is_some_and(|org| org.is_library())
    }

    /// Sequential content the editor can open.
    pub fn is_editable_sequential(&self) -> bool {
        !self.info.is_migrated()
            && !self.info.is_alias()
            && !self.is_directory()
            && self.info.organization != Some(crate::api::DatasetOrganization::Vsam)
    }

    pub fn record_layout(&self) -> Option<RecordLayout> {
        Some(RecordLayout {
            format: self.info.record_format?,
            record_length: self.info.record_length?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAttributes {
    pub info: MemberInfo,
    pub parent: FileHandle,
    pub content_mode: ContentMode,
}

impl MemberAttributes {
    pub fn new(info: MemberInfo, parent: FileHandle) -> Self {
        Self {
            info,
            parent,
            content_mode: ContentMode::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UssAttributes {
    /// Absolute USS path.
    pub path: String,
    pub entry: UssEntry,
    pub url: String,
    pub requesters: Vec<Requester>,
    pub content_mode: ContentMode,
    pub charset: Charset,
}

impl UssAttributes {
    pub fn new(
        parent_dir: &str,
        entry: UssEntry,
        url: impl Into<String>,
        requesters: Vec<Requester>,
    ) -> Self {
        let path = if parent_dir.ends_with('/') {
            format!("{parent_dir}{}", entry.name)
        } else {
            format!("{parent_dir}/{}", entry.name)
        };
        Self {
            path,
            entry,
            url: url.into(),
            requesters,
            content_mode: ContentMode::Text,
            charset: Charset::DEFAULT_TEXT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolFileAttributes {
    pub info: SpoolFileInfo,
    pub parent: FileHandle,
    pub content_mode: ContentMode,
}

impl SpoolFileAttributes {
    pub fn new(info: SpoolFileInfo, parent: FileHandle) -> Self {
        Self {
            info,
            parent,
            content_mode: ContentMode::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAttributes {
    pub info: JobInfo,
    pub url: String,
    pub requesters: Vec<Requester>,
}

impl JobAttributes {
    pub fn new(info: JobInfo, url: impl Into<String>, requesters: Vec<Requester>) -> Self {
        Self {
            info,
            url: url.into(),
            requesters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAttributes {
    Dataset(DatasetAttributes),
    Member(MemberAttributes),
    UssFile(UssAttributes),
    SpoolFile(SpoolFileAttributes),
    Job(JobAttributes),
}

impl FileAttributes {
    pub fn category(&self) -> EntityCategory {
        match self {
            FileAttributes::Dataset(_) => EntityCategory::Dataset,
            FileAttributes::Member(_) => EntityCategory::Member,
            FileAttributes::UssFile(_) => EntityCategory::UssFile,
            FileAttributes::SpoolFile(_) => EntityCategory::SpoolFile,
            FileAttributes::Job(_) => EntityCategory::Job,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileAttributes::Dataset(a) => &a.info.name,
            FileAttributes::Member(a) => &a.info.name,
            FileAttributes::UssFile(a) => &a.entry.name,
            FileAttributes::SpoolFile(a) => &a.info.dd_name,
            FileAttributes::Job(a) => &a.info.job_name,
        }
    }

    /// Requesters of connection-rooted records; dependents report none.
    pub fn requesters(&self) -> &[Requester] {
        match self {
            FileAttributes::Dataset(a) => &a.requesters,
            FileAttributes::UssFile(a) => &a.requesters,
            FileAttributes::Job(a) => &a.requesters,
            FileAttributes::Member(_) | FileAttributes::SpoolFile(_) => &[],
        }
    }

    pub fn requesters_mut(&mut self) -> Option<&mut Vec<Requester>> {
        match self {
            FileAttributes::Dataset(a) => Some(&mut a.requesters),
            FileAttributes::UssFile(a) => Some(&mut a.requesters),
            FileAttributes::Job(a) => Some(&mut a.requesters),
            FileAttributes::Member(_) | FileAttributes::SpoolFile(_) => None,
        }
    }

    pub fn parent(&self) -> Option<&FileHandle> {
        match self {
            FileAttributes::Member(a) => Some(&a.parent),
            FileAttributes::SpoolFile(a) => Some(&a.parent),
            _ => None,
        }
    }

    pub fn content_mode(&self) -> ContentMode {
        match self {
            FileAttributes::Dataset(a) => a.content_mode,
            FileAttributes::Member(a) => a.content_mode,
            FileAttributes::UssFile(a) => a.content_mode,
            FileAttributes::SpoolFile(a) => a.content_mode,
            FileAttributes::Job(_) => ContentMode::Text,
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            FileAttributes::Dataset(a) => a.is_directory(),
            FileAttributes::UssFile(a) => a.entry.is_directory(),
            FileAttributes::Job(_) => true,
            FileAttributes::Member(_) | FileAttributes::SpoolFile(_) => false,
        }
    }

    pub fn file_kind(&self) -> FileKind {
        if self.is_directory() {
            FileKind::MfDirectory
        } else {
            FileKind::MfFile
        }
    }

    /// Path of the virtual file representing this record.
    ///
    /// Connection-rooted records live under the trimmed connection URL;
    /// dependents live under their parent.
    pub fn virtual_path(&self) -> String {
        match self {
            FileAttributes::Dataset(a) => format!(
                "{}/datasets/{}/{}",
                trim_url(&a.url),
                a.info.volser.as_deref().unwrap_or(crate::api::MIGRATED_VOLSER),
                a.info.name
            ),
            FileAttributes::UssFile(a) => format!("{}/uss{}", trim_url(&a.url), a.path),
            FileAttributes::Job(a) => format!(
                "{}/jobs/{}.{}",
                trim_url(&a.url),
                a.info.job_name,
                a.info.job_id
            ),
            FileAttributes::Member(a) => format!("{}/{}", a.parent.path(), a.info.name),
            FileAttributes::SpoolFile(a) => {
                format!("{}/{}.{}", a.parent.path(), a.info.dd_name, a.info.id)
            }
        }
    }

    /// Fold a freshly listed record into an existing one for the same file.
    ///
    /// Listing data comes from `incoming`; requesters accumulate; editor-side
    /// settings (content mode, charset) survive.
    pub fn merge(self, incoming: FileAttributes) -> FileAttributes {
        match (self, incoming) {
            (FileAttributes::Dataset(mut old), FileAttributes::Dataset(new)) => {
                old.info = new.info;
                old.url = new.url;
                merge_requesters(&mut old.requesters, new.requesters);
                FileAttributes::Dataset(old)
            }
            (FileAttributes::UssFile(mut old), FileAttributes::UssFile(new)) => {
                old.entry = new.entry;
                old.url = new.url;
                merge_requesters(&mut old.requesters, new.requesters);
                FileAttributes::UssFile(old)
            }
            (FileAttributes::Job(mut old), FileAttributes::Job(new)) => {
                old.info = new.info;
                old.url = new.url;
                merge_requesters(&mut old.requesters, new.requesters);
                FileAttributes::Job(old)
            }
            (FileAttributes::Member(mut old), FileAttributes::Member(new)) => {
                old.info = new.info;
                FileAttributes::Member(old)
            }
            (FileAttributes::SpoolFile(mut old), FileAttributes::SpoolFile(new)) => {
                old.info = new.info;
                FileAttributes::SpoolFile(old)
            }
            (_, new) => new,
        }
    }

    pub fn as_dataset(&self) -> Option<&DatasetAttributes> {
        match self {
            FileAttributes::Dataset(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&MemberAttributes> {
        match self {
            FileAttributes::Member(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_uss(&self) -> Option<&UssAttributes> {
        match self {
            FileAttributes::UssFile(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_uss_mut(&mut self) -> Option<&mut UssAttributes> {
        match self {
            FileAttributes::UssFile(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_spool_file(&self) -> Option<&SpoolFileAttributes> {
        match self {
            FileAttributes::SpoolFile(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&JobAttributes> {
        match self {
            FileAttributes::Job(a) => Some(a),
            _ => None,
        }
    }
}

// =============================================================================
// AttributesService
// =============================================================================

/// Maps virtual file handles to their remote metadata.
pub trait AttributesService: Send + Sync {
    fn get_attributes(&self, file: &FileHandle) -> Option<FileAttributes>;

    /// Handle for `attributes`, creating it when the entity is new and merging
    /// requesters into the existing record otherwise.
    fn get_or_create_virtual_file(&self, attributes: FileAttributes) -> Option<FileHandle>;

    fn clear_attributes(&self, file: &FileHandle);

    /// Apply `mutator` to the record of `file`; false when there is none.
    fn update_attributes(
        &self,
        file: &FileHandle,
        mutator: &mut dyn FnMut(&mut FileAttributes),
    ) -> bool;
}
