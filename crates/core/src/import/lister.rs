//! Paged category member listing.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::ImportError;
use crate::commons::{CommonsApi, CommonsError, MemberRef};
use crate::config::MAX_PAGE_SIZE;

/// Lists every file member of a category, following continuation tokens.
pub struct PagedCategoryLister {
    api: Arc<dyn CommonsApi>,
    page_size: u32,
}

impl PagedCategoryLister {
    /// `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(api: Arc<dyn CommonsApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Return all members in arrival order, without duplicate page ids.
    ///
    /// Any failed page aborts the listing; no partial result is returned.
    /// A continuation token seen earlier in the same listing is a loop and
    /// aborts it too.
    pub async fn list(&self, category: &str) -> Result<Vec<MemberRef>, ImportError> {
        let mut members = Vec::new();
        let mut seen = HashSet::new();
        let mut tokens = HashSet::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .api
                .list_category_members(category, continuation.as_deref(), self.page_size)
                .await
                .map_err(|e| ImportError::fetch(list_context(category, continuation.as_deref()), e))?;
            pages += 1;

            for member in page.members {
                if seen.insert(member.page_id) {
                    members.push(member);
                } else {
                    debug!("Dropping duplicate member {} ({})", member.page_id, member.title);
                }
            }

            match page.continuation {
                Some(next) if !tokens.insert(next.clone()) => {
                    return Err(ImportError::fetch(
                        list_context(category, Some(&next)),
                        CommonsError::Parse(format!("continuation token '{}' repeated", next)),
                    ));
                }
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(
            "Listed {} members of '{}' in {} page(s)",
            members.len(),
            category,
            pages
        );

        Ok(members)
    }
}

fn list_context(category: &str, continuation: Option<&str>) -> String {
    format!(
        "listing members of '{}' (continuation {:?})",
        category, continuation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::MemberPage;
    use crate::testing::{fixtures, MockCommonsApi, RecordedCommonsQuery};

    const CATEGORY: &str = "Category:Maps of Finland";

    #[tokio::test]
    async fn test_lists_across_pages() {
        let api = Arc::new(MockCommonsApi::new());
        for id in 1..=7 {
            api.add_file(CATEGORY, fixtures::file_info(id, &format!("Map {}.jpg", id)))
                .await;
        }

        let lister = PagedCategoryLister::new(api.clone(), 3);
        let members = lister.list(CATEGORY).await.unwrap();

        let ids: Vec<u64> = members.iter().map(|m| m.page_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(api.query_count().await, 3);

        let queries = api.recorded_queries().await;
        assert!(matches!(
            &queries[0],
            RecordedCommonsQuery::ListMembers { continuation: None, limit: 3, .. }
        ));
        assert!(matches!(
            &queries[1],
            RecordedCommonsQuery::ListMembers { continuation: Some(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_category() {
        let api = Arc::new(MockCommonsApi::new());
        let lister = PagedCategoryLister::new(api, 500);
        assert!(lister.list(CATEGORY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_dropped() {
        let api = Arc::new(MockCommonsApi::new());
        api.set_member_page(
            CATEGORY,
            None,
            MemberPage {
                members: vec![fixtures::member(1, "A.jpg"), fixtures::member(2, "B.jpg")],
                continuation: Some("t1".to_string()),
            },
        )
        .await;
        api.set_member_page(
            CATEGORY,
            Some("t1"),
            MemberPage {
                members: vec![fixtures::member(2, "B.jpg"), fixtures::member(3, "C.jpg")],
                continuation: None,
            },
        )
        .await;

        let lister = PagedCategoryLister::new(api, 2);
        let ids: Vec<u64> = lister
            .list(CATEGORY)
            .await
            .unwrap()
            .iter()
            .map(|m| m.page_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_repeated_continuation_aborts() {
        let api = Arc::new(MockCommonsApi::new());
        api.set_member_page(
            CATEGORY,
            None,
            MemberPage {
                members: vec![fixtures::member(1, "A.jpg")],
                continuation: Some("loop".to_string()),
            },
        )
        .await;
        api.set_member_page(
            CATEGORY,
            Some("loop"),
            MemberPage {
                members: vec![fixtures::member(2, "B.jpg")],
                continuation: Some("loop".to_string()),
            },
        )
        .await;

        let lister = PagedCategoryLister::new(api, 1);
        let result = lister.list(CATEGORY).await;
        assert!(matches!(result, Err(ImportError::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn test_continuation_cycle_aborts() {
        let api = Arc::new(MockCommonsApi::new());
        let pages = [
            (None, 1, "a"),
            (Some("a"), 2, "b"),
            (Some("b"), 3, "a"),
        ];
        for (token, id, next) in pages {
            api.set_member_page(
                CATEGORY,
                token,
                MemberPage {
                    members: vec![fixtures::member(id, &format!("{}.jpg", id))],
                    continuation: Some(next.to_string()),
                },
            )
            .await;
        }

        let lister = PagedCategoryLister::new(api.clone(), 1);
        let result = lister.list(CATEGORY).await;

        match result {
            Err(ImportError::FetchFailed { context, .. }) => {
                assert!(context.contains("\"a\""), "context: {}", context);
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
        assert_eq!(api.query_count().await, 3);
    }

    #[tokio::test]
    async fn test_failed_page_aborts_listing() {
        let api = Arc::new(MockCommonsApi::new());
        for id in 1..=4 {
            api.add_file(CATEGORY, fixtures::file_info(id, &format!("Map {}.jpg", id)))
                .await;
        }
        // Second page request fails.
        api.fail_call(1, CommonsError::Api {
            status: 503,
            message: "unavailable".to_string(),
        })
        .await;

        let lister = PagedCategoryLister::new(api, 2);
        match lister.list(CATEGORY).await {
            Err(ImportError::FetchFailed { context, source }) => {
                assert!(context.contains(CATEGORY));
                assert!(matches!(source, CommonsError::Api { status: 503, .. }));
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_page_size_is_clamped() {
        let api: Arc<dyn CommonsApi> = Arc::new(MockCommonsApi::new());
        assert_eq!(PagedCategoryLister::new(api.clone(), 0).page_size, 1);
        assert_eq!(PagedCategoryLister::new(api, 10_000).page_size, MAX_PAGE_SIZE);
    }
}
