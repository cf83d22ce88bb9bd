//! Mock Commons API for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::commons::{
    CategoryInfo, CommonsApi, CommonsError, FileInfo, MemberPage, MemberRef, PageContent,
};

const CONTINUATION_PREFIX: &str = "file|";

/// A recorded Commons request for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommonsQuery {
    ListMembers {
        category: String,
        continuation: Option<String>,
        limit: u32,
    },
    FileInfo {
        page_id: u64,
    },
    CategoryInfo {
        category: String,
    },
    PageContent {
        page_id: u64,
    },
}

/// Mock implementation of the CommonsApi trait.
///
/// Provides controllable behavior for testing:
/// - Categories and files held in memory, paged by the requested limit
/// - Scripted listing pages for continuation edge cases
/// - Track queries for assertions
/// - Simulate failures, either on the next call or on a given call index
///
/// # Example
///
/// ```rust,ignore
/// use wikimaps_core::testing::{MockCommonsApi, fixtures};
///
/// let api = MockCommonsApi::new();
/// api.add_file("Category:Test maps", fixtures::file_info(100, "A.jpg")).await;
///
/// let page = api.list_category_members("Category:Test maps", None, 500).await?;
/// assert_eq!(page.members.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockCommonsApi {
    /// Category members, in listing order.
    categories: Arc<RwLock<HashMap<String, Vec<MemberRef>>>>,
    /// Scripted listing pages by (category, continuation).
    scripted_pages: Arc<RwLock<HashMap<(String, Option<String>), MemberPage>>>,
    /// File count overrides by category.
    file_counts: Arc<RwLock<HashMap<String, u64>>>,
    /// File metadata by page id.
    files: Arc<RwLock<HashMap<u64, FileInfo>>>,
    /// Raw wikitext by page id.
    contents: Arc<RwLock<HashMap<u64, String>>>,
    /// Recorded queries.
    queries: Arc<RwLock<Vec<RecordedCommonsQuery>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<CommonsError>>>,
    /// Errors keyed by zero-based call index.
    call_errors: Arc<RwLock<HashMap<usize, CommonsError>>>,
    /// File info errors keyed by page id.
    file_errors: Arc<RwLock<HashMap<u64, CommonsError>>>,
}

impl MockCommonsApi {
    /// Create a new empty mock Commons API.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Category Configuration
    // =========================================================================

    /// Add a file to a category (and make its metadata available).
    pub async fn add_file(&self, category: &str, info: FileInfo) {
        self.categories
            .write()
            .await
            .entry(category.to_string())
            .or_default()
            .push(MemberRef {
                page_id: info.page_id,
                title: info.title.clone(),
            });
        self.files.write().await.insert(info.page_id, info);
    }

    /// Make file metadata available without adding the file to a category.
    pub async fn add_file_info(&self, info: FileInfo) {
        self.files.write().await.insert(info.page_id, info);
    }

    /// Register an empty, existing category.
    pub async fn add_category(&self, category: &str) {
        self.categories
            .write()
            .await
            .entry(category.to_string())
            .or_default();
    }

    /// Answer a listing request for `(category, continuation)` with `page`,
    /// bypassing the automatic paging.
    pub async fn set_member_page(
        &self,
        category: &str,
        continuation: Option<&str>,
        page: MemberPage,
    ) {
        self.scripted_pages.write().await.insert(
            (category.to_string(), continuation.map(str::to_string)),
            page,
        );
    }

    /// Override the file count reported for a category.
    pub async fn set_file_count(&self, category: &str, count: u64) {
        self.file_counts
            .write()
            .await
            .insert(category.to_string(), count);
    }

    /// Set the raw wikitext of a page.
    pub async fn set_page_content(&self, page_id: u64, content: String) {
        self.contents.write().await.insert(page_id, content);
    }

    // =========================================================================
    // Query Recording
    // =========================================================================

    /// Get all recorded queries.
    pub async fn recorded_queries(&self) -> Vec<RecordedCommonsQuery> {
        self.queries.read().await.clone()
    }

    /// Clear recorded queries. Call indexes restart at zero.
    pub async fn clear_recorded(&self) {
        self.queries.write().await.clear();
    }

    /// Get the number of queries performed.
    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: CommonsError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Fail the call with the given zero-based index (counting every
    /// operation since creation or the last `clear_recorded`).
    pub async fn fail_call(&self, index: usize, error: CommonsError) {
        self.call_errors.write().await.insert(index, error);
    }

    /// Fail file info requests for one page.
    pub async fn fail_file_info(&self, page_id: u64, error: CommonsError) {
        self.file_errors.write().await.insert(page_id, error);
    }

    /// Record a query and return the error injected for it, if any.
    async fn record(&self, query: RecordedCommonsQuery) -> Result<(), CommonsError> {
        let index = {
            let mut queries = self.queries.write().await;
            queries.push(query);
            queries.len() - 1
        };

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self.call_errors.write().await.remove(&index) {
            return Err(err);
        }
        Ok(())
    }

    async fn auto_page(
        &self,
        category: &str,
        continuation: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, CommonsError> {
        let offset = match continuation {
            None => 0,
            Some(token) => token
                .strip_prefix(CONTINUATION_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| CommonsError::Upstream {
                    code: "badcontinue".to_string(),
                    info: format!("Invalid continue param: {}", token),
                })?,
        };

        let categories = self.categories.read().await;
        let members = categories.get(category).map(Vec::as_slice).unwrap_or(&[]);
        let end = (offset + limit.max(1) as usize).min(members.len());
        let page_members = members.get(offset..end).unwrap_or(&[]).to_vec();

        let continuation = if end < members.len() {
            Some(format!("{}{}", CONTINUATION_PREFIX, end))
        } else {
            None
        };

        Ok(MemberPage {
            members: page_members,
            continuation,
        })
    }
}

#[async_trait]
impl CommonsApi for MockCommonsApi {
    async fn list_category_members(
        &self,
        category: &str,
        continuation: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, CommonsError> {
        self.record(RecordedCommonsQuery::ListMembers {
            category: category.to_string(),
            continuation: continuation.map(str::to_string),
            limit,
        })
        .await?;

        let scripted = self
            .scripted_pages
            .read()
            .await
            .get(&(category.to_string(), continuation.map(str::to_string)))
            .cloned();

        match scripted {
            Some(page) => Ok(page),
            None => self.auto_page(category, continuation, limit).await,
        }
    }

    async fn file_info(&self, page_id: u64) -> Result<FileInfo, CommonsError> {
        self.record(RecordedCommonsQuery::FileInfo { page_id }).await?;

        if let Some(err) = self.file_errors.write().await.remove(&page_id) {
            return Err(err);
        }

        self.files
            .read()
            .await
            .get(&page_id)
            .cloned()
            .ok_or_else(|| CommonsError::NotFound(format!("page {} is missing", page_id)))
    }

    async fn category_info(&self, category: &str) -> Result<CategoryInfo, CommonsError> {
        self.record(RecordedCommonsQuery::CategoryInfo {
            category: category.to_string(),
        })
        .await?;

        if let Some(count) = self.file_counts.read().await.get(category) {
            return Ok(CategoryInfo {
                found: true,
                file_count: *count,
            });
        }

        let listed = self
            .categories
            .read()
            .await
            .get(category)
            .map(|members| members.len() as u64);

        let scripted: Option<u64> = {
            let pages = self.scripted_pages.read().await;
            let mut total = None;
            for ((name, _), page) in pages.iter() {
                if name == category {
                    *total.get_or_insert(0) += page.members.len() as u64;
                }
            }
            total
        };

        match listed.or(scripted) {
            Some(file_count) => Ok(CategoryInfo {
                found: true,
                file_count,
            }),
            None => Ok(CategoryInfo::not_found()),
        }
    }

    async fn page_content(&self, page_id: u64) -> Result<PageContent, CommonsError> {
        self.record(RecordedCommonsQuery::PageContent { page_id })
            .await?;

        Ok(match self.contents.read().await.get(&page_id) {
            Some(content) => PageContent {
                found: true,
                raw_content: content.clone(),
            },
            None => PageContent::missing(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_auto_paging() {
        let api = MockCommonsApi::new();
        for id in 1..=3 {
            api.add_file("Category:X", fixtures::file_info(id, &format!("{}.jpg", id)))
                .await;
        }

        let first = api.list_category_members("Category:X", None, 2).await.unwrap();
        assert_eq!(first.members.len(), 2);
        let token = first.continuation.unwrap();

        let second = api
            .list_category_members("Category:X", Some(&token), 2)
            .await
            .unwrap();
        assert_eq!(second.members.len(), 1);
        assert_eq!(second.members[0].page_id, 3);
        assert!(second.continuation.is_none());
    }

    #[tokio::test]
    async fn test_bad_continuation_is_upstream_error() {
        let api = MockCommonsApi::new();
        let result = api
            .list_category_members("Category:X", Some("bogus"), 2)
            .await;
        assert!(matches!(result, Err(CommonsError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_category_info() {
        let api = MockCommonsApi::new();
        api.add_category("Category:Empty").await;
        api.add_file("Category:X", fixtures::file_info(1, "1.jpg")).await;
        api.set_file_count("Category:Big", 581).await;

        assert_eq!(api.category_info("Category:X").await.unwrap().file_count, 1);
        assert_eq!(
            api.category_info("Category:Big").await.unwrap().file_count,
            581
        );
        let empty = api.category_info("Category:Empty").await.unwrap();
        assert!(empty.found);
        assert_eq!(empty.file_count, 0);
        assert!(!api.category_info("Category:Nope").await.unwrap().found);
    }

    #[tokio::test]
    async fn test_call_index_error_injection() {
        let api = MockCommonsApi::new();
        api.add_file("Category:X", fixtures::file_info(1, "1.jpg")).await;
        api.fail_call(1, CommonsError::Parse("boom".to_string())).await;

        assert!(api.file_info(1).await.is_ok());
        assert!(matches!(
            api.file_info(1).await,
            Err(CommonsError::Parse(_))
        ));
        assert!(api.file_info(1).await.is_ok());
        assert_eq!(api.query_count().await, 3);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let api = MockCommonsApi::new();
        api.set_next_error(CommonsError::NotConfigured("x".to_string()))
            .await;

        assert!(api.page_content(1).await.is_err());
        assert_eq!(api.page_content(1).await.unwrap(), PageContent::missing());
    }
}
