//! Per-member file metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ImportError;
use crate::commons::{CommonsApi, CommonsError, MemberRef};

/// What the importer needs to know about one category member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberMetadata {
    pub page_id: u64,
    pub title: String,
    /// Direct URL of the uploaded file.
    pub file_url: String,
    /// URL of the file description page.
    pub description_url: String,
    /// Final path segment of `file_url`.
    pub unique_id: String,
}

/// Fetches file metadata for category members, one request per member.
pub struct MemberMetadataFetcher {
    api: Arc<dyn CommonsApi>,
}

impl MemberMetadataFetcher {
    pub fn new(api: Arc<dyn CommonsApi>) -> Self {
        Self { api }
    }

    pub async fn fetch(&self, member: &MemberRef) -> Result<MemberMetadata, ImportError> {
        let context = || format!("file info for page {} ({})", member.page_id, member.title);

        let info = self
            .api
            .file_info(member.page_id)
            .await
            .map_err(|e| ImportError::fetch(context(), e))?;

        let unique_id =
            unique_id_from_url(&info.image_url).map_err(|e| ImportError::fetch(context(), e))?;

        Ok(MemberMetadata {
            page_id: member.page_id,
            title: info.title,
            file_url: info.image_url,
            description_url: info.description_url,
            unique_id,
        })
    }
}

/// Last non-empty path segment of a file URL, as it appears in the URL.
pub(crate) fn unique_id_from_url(file_url: &str) -> Result<String, CommonsError> {
    let url = Url::parse(file_url)
        .map_err(|e| CommonsError::Parse(format!("invalid file url '{}': {}", file_url, e)))?;

    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| CommonsError::MissingField(format!("file name in url '{}'", file_url)))
}
