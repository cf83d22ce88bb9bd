//! Wikimedia Commons API integration.
//!
//! One typed client covers the four `action=query` operations the import
//! pipeline needs: category member listing, file metadata, category info and
//! raw page content.

mod client;
mod types;
mod wire;

pub use client::CommonsClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the Commons API.
#[derive(Debug, Error)]
pub enum CommonsError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The API answered with an `error` payload.
    #[error("Upstream error {code}: {info}")]
    Upstream { code: String, info: String },

    /// Body was not the JSON we expected.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A required nested field was absent.
    #[error("Missing field in response: {0}")]
    MissingField(String),

    /// The requested page or category does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client could not be built from its configuration.
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

/// The logical Commons operations used by the importer.
#[async_trait]
pub trait CommonsApi: Send + Sync {
    /// Fetch one page of file members of `category`.
    ///
    /// `continuation` is the token returned by the previous page, if any.
    async fn list_category_members(
        &self,
        category: &str,
        continuation: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, CommonsError>;

    /// Fetch the file URL and description URL of a member.
    async fn file_info(&self, page_id: u64) -> Result<FileInfo, CommonsError>;

    /// Fetch category info (file count).
    async fn category_info(&self, category: &str) -> Result<CategoryInfo, CommonsError>;

    /// Fetch the raw wikitext of a page.
    async fn page_content(&self, page_id: u64) -> Result<PageContent, CommonsError>;
}
