//! Library member content.
//!
//! Members carry no requesters of their own: every call goes through the
//! parent library's requesters, so the library record must be present.

use crate::api::RemoteApi;
use crate::attributes::{
    AttributesService, DatasetAttributes, EntityCategory, FileAttributes, MemberAttributes,
};
use crate::content::{self, ContentAdapter};
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressIndicator};
use crate::sync::requesters::first_successful;
use crate::sync::RemoteContentAccess;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

pub struct MemberContentAccess {
    api: Arc<dyn RemoteApi>,
    attributes: Arc<dyn AttributesService>,
}

impl MemberContentAccess {
    pub fn new(api: Arc<dyn RemoteApi>, attributes: Arc<dyn AttributesService>) -> Self {
        Self { api, attributes }
    }

    /// Member record plus its parent library record.
    fn resolve<'a>(
        &self,
        attributes: &'a FileAttributes,
    ) -> Result<(&'a MemberAttributes, DatasetAttributes)> {
        let member = attributes
            .as_member()
            .ok_or_else(|| SyncError::NoAttributes(attributes.name().to_string()))?;
        let library = self
            .attributes
            .get_attributes(&member.parent)
            .and_then(|parent| parent.as_dataset().cloned())
            .ok_or_else(|| SyncError::ParentAttributesNotFound {
                kind: "library",
                path: member.parent.path().to_string(),
            })?;
        debug!(library = %library.info.name, member = %member.info.name, "resolved parent library");
        Ok((member, library))
    }
}

impl RemoteContentAccess for MemberContentAccess {
    fn category(&self) -> EntityCategory {
        EntityCategory::Member
    }

    fn content_adapter(&self, attributes: &FileAttributes) -> Result<Box<dyn ContentAdapter>> {
        let (member, library) = self.resolve(attributes)?;
        Ok(content::adapter_for(member.content_mode, library.record_layout()))
    }

    fn fetch_remote_content(
        &self,
        attributes: &FileAttributes,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Bytes> {
        let (member, library) = self.resolve(attributes)?;
        let target = format!("{}({})", library.info.name, member.info.name);
        info!(member = %target, "fetching remote content");
        let head = format!("Cannot fetch data from {target}");
        first_successful(&library.requesters, &target, progress, |requester| {
            let body = self
                .api
                .retrieve_member_content(
                    &requester.connection,
                    &library.info.name,
                    &member.info.name,
                    member.content_mode,
                )?
                .into_body(&head)?;
            progress::check_cancelled(progress)?;
            Ok(content::from_transfer(member.content_mode, body))
        })
    }

    fn upload_new_content(
        &self,
        attributes: &FileAttributes,
        new_content: &[u8],
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<()> {
        let (member, library) = self.resolve(attributes)?;
        let target = format!("{}({})", library.info.name, member.info.name);
        info!(member = %target, "uploading new content");
        let head = format!("Cannot upload data to {target}");
        let payload = content::to_transfer(member.content_mode, new_content);
        first_successful(&library.requesters, &target, progress, |requester| {
            self.api
                .write_member_content(
                    &requester.connection,
                    &library.info.name,
                    &member.info.name,
                    member.content_mode,
                    payload.clone(),
                )?
                .into_body(&head)
        })
    }
}
