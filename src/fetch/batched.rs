//! Paging adapter for listings the server returns in batches.

use crate::api::{ApiResponse, BatchedList, Page};
use crate::attributes::{EntityCategory, FileAttributes};
use crate::error::{response_message_map, CallError, Result};
use crate::fetch::{FetchSource, QueryRequest, RemoteQuery};
use crate::progress::ProgressIndicator;
use crate::vfs::FileHandle;
use tracing::info;

/// A listing the server can return page by page.
pub trait BatchedSource: Send + Sync {
    type Request: QueryRequest;
    type Item: Send;

    fn category(&self) -> EntityCategory;

    /// Head message for a failed page when the reason has no mapping.
    fn default_error_message(&self) -> &'static str;

    fn fetch_batch(
        &self,
        query: &RemoteQuery<Self::Request>,
        page: Page<'_>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<ApiResponse<BatchedList<Self::Item>>>;

    /// Name the server pages by.
    fn item_name(item: &Self::Item) -> &str;

    fn build_attributes(
        &self,
        query: &RemoteQuery<Self::Request>,
        item: Self::Item,
    ) -> Result<FileAttributes>;

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<Self::Request>);
}

/// Turns a `BatchedSource` into a `FetchSource`.
///
/// Unit queries list everything in one unbounded request. Batched queries
/// ask for `batch_size` items after the cursor; since the server lists from
/// the cursor inclusive, a continuation asks for one extra item and drops the
/// first one.
pub struct BatchedFetch<B> {
    source: B,
    batch_size: usize,
}

impl<B: BatchedSource> BatchedFetch<B> {
    pub fn new(source: B, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }

    pub fn inner(&self) -> &B {
        &self.source
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn page_items(
        &self,
        response: ApiResponse<BatchedList<B::Item>>,
    ) -> Result<BatchedList<B::Item>> {
        let head = response_message_map(&response.reason)
            .unwrap_or_else(|| self.source.default_error_message());
        if !response.is_successful() {
            return Err(CallError::from_response(&response, head).into());
        }
        Ok(response.body.unwrap_or(BatchedList {
            items: Vec::new(),
            total_rows: 0,
        }))
    }

    fn fetch_unit(
        &self,
        query: &RemoteQuery<B::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<B::Item>> {
        let response = self.source.fetch_batch(query, Page::UNBOUNDED, progress)?;
        Ok(self.page_items(response)?.items)
    }

    fn fetch_page(
        &self,
        query: &RemoteQuery<B::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<B::Item>> {
        let Some(cursor) = query.progress() else {
            return self.fetch_unit(query, progress);
        };
        if !cursor.fetch_needed {
            return Ok(Vec::new());
        }

        let limit = if cursor.start.is_some() {
            self.batch_size + 1
        } else {
            self.batch_size
        };
        let page = Page {
            start: cursor.start.as_deref(),
            limit: Some(limit),
        };
        let response = self.source.fetch_batch(query, page, progress);

        let mut outcome = response.and_then(|r| self.page_items(r));
        if let Ok(list) = &mut outcome {
            if cursor.already_fetched != 0 && !list.items.is_empty() {
                list.items.remove(0);
            }
            let total = list.total_rows;
            let last = list.items.last().map(|i| B::item_name(i).to_string());
            let count = list.items.len();
            query.update_progress(|p| {
                p.total_rows = p.total_rows.or(Some(total));
                if let Some(last) = last {
                    p.start = Some(last);
                }
                p.already_fetched += count;
            });
            info!(?query, count, "page fetched");
        }
        query.update_progress(|p| {
            p.fetch_needed = p.total_rows.is_some_and(|total| total != p.already_fetched);
        });
        outcome.map(|list| list.items)
    }
}

impl<B: BatchedSource> FetchSource for BatchedFetch<B> {
    type Request = B::Request;

    fn category(&self) -> EntityCategory {
        self.source.category()
    }

    fn fetch(
        &self,
        query: &RemoteQuery<B::Request>,
        progress: Option<&dyn ProgressIndicator>,
    ) -> Result<Vec<FileAttributes>> {
        let items = if query.is_batched() {
            self.fetch_page(query, progress)?
        } else {
            self.fetch_unit(query, progress)?
        };
        items
            .into_iter()
            .map(|item| self.source.build_attributes(query, item))
            .collect()
    }

    fn cleanup_unused_file(&self, file: &FileHandle, query: &RemoteQuery<B::Request>) {
        self.source.cleanup_unused_file(file, query);
    }
}
