//! USS file content.

use crate::api::RemoteApi;
use crate::attributes::{AttributesService, EntityCategory, FileAttributes, UssAttributes};
use crate::content::{self, Charset, ContentAdapter};
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressIndicator};
use crate::sync::requesters::first_successful;
use crate::sync::RemoteContentAccess;
use crate::vfs::FileHandle;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of `chtag -p` for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTag {
    Text(Charset),
    Binary,
    Untagged,
}

impl FileTag {
    /// Parse a line such as `t IBM-1047    T=on  /u/user/file`.
    pub fn parse(stdout: &str) -> FileTag {
        let mut fields = stdout.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("t"), Some(charset)) if charset != "untagged" => {
                FileTag::Text(Charset::new(charset))
            }
            (Some("b"), _) => FileTag::Binary,
            _ => FileTag::Untagged,
        }
    }

    pub fn charset(&self) -> Charset {
        match self {
            FileTag::Text(charset) => charset.clone(),
            FileTag::Binary => Charset::DEFAULT_BINARY,
            FileTag::Untagged => Charset::DEFAULT_TEXT,
        }
    }
}

pub struct UssFileContentAccess {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
}

impl UssFileContentAccess {
    pub fn new(api: Arc<dyn RemoteApi>, attributes: Arc<dyn AttributesService>) -> Self {
        Self { api, attributes }
    }

    fn uss<'a>(&self, attributes: &'a FileAttributes) -> Result<&'a UssAttributes> {
        attributes
            .as_uss()
            .ok_or_else(|| SyncError::NoAttributes(attributes.name().to_string()))
    }

    fn read_file_tag(
        &self,
        uss: &UssAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<FileTag> {
        let head = format!("Cannot list a USS file tag for {}", uss.path);
        first_successful(&uss.requesters, &uss.path, progress, |requester| {
            let stdout = self
                .api
                .list_uss_file_tag(&requester.connection, &uss.path)?
                .into_body(&head)?;
            Ok(FileTag::parse(&stdout))
        })
    }
}

impl RemoteContentAccess for UssFileContentAccess {
    fn category(&self) -> EntityCategory {
        EntityCategory::UssFile
    }

    fn accepts_attributes(&self, attributes: &FileAttributes) -> bool {
        attributes.as_uss().is_some_and(|uss| !uss.entry.is_directory())
    }

    /// Charset from the remote file tag, recorded on the attributes.
    fn detect_encoding(
        &self,
        file: &FileHandle,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Charset {
        let Some(uss) = attributes.as_uss() else {
            return Charset::DEFAULT_TEXT;
        };
        let charset = match self.read_file_tag(uss, progress) {
            Ok(tag) => {
                debug!(path = %uss.path, ?tag, "read file tag");
                tag.charset()
            }
            Err(e) => {
                warn!(path = %uss.path, error = %e, "cannot list file tag, assuming text");
                Charset::DEFAULT_TEXT
            }
        };
        let recorded = charset.clone();
        self.attributes.update_attributes(file, &mut |attrs| {
            if let Some(uss) = attrs.as_uss_mut() {
                uss.charset = recorded.clone();
            }
        });
        charset
    }

    fn content_adapter(&self, attributes: &FileAttributes) -> Result<Box<dyn ContentAdapter>> {
        let uss = self.uss(attributes)?;
        Ok(content::adapter_for(uss.content_mode, None))
    }

    fn fetch_remote_content(
        &self,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Bytes> {
        let uss = self.uss(attributes)?;
        info!(path = %uss.path, "fetching remote content");
        let head = format!("Cannot fetch data from {}", uss.path);
        first_successful(&uss.requesters, &uss.path, progress, |requester| {
            let body = self
                .api
                .retrieve_uss_file_content(&requester.connection, &uss.path, uss.content_mode)?
                .into_body(&head)?;
            progress::check_cancelled(progress)?;
            Ok(content::from_transfer(uss.content_mode, body))
        })
    }

    fn upload_new_content(
        &self,
        attributes: &FileAttributes,
        new_content: &[u8],
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()> {
        let uss = self.uss(attributes)?;
        info!(path = %uss.path, "uploading new content");
        let head = format!("Cannot upload data to {}", uss.path);
        let payload = content::to_transfer(uss.content_mode, new_content);
        first_successful(&uss.requesters, &uss.path, progress, |requester| {
            self.api
                .write_uss_file_content(
                    &requester.connection,
                    &uss.path,
                    uss.content_mode,
                    payload.clone(),
                )?
                .into_body(&head)
        })
    }
}
