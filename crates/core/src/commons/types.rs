//! Types returned by the Commons client.

use serde::{Deserialize, Serialize};

/// A file belonging to a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRef {
    /// Commons page id (stable across renames).
    pub page_id: u64,
    /// Page title, e.g. "File:Senate Atlas, 1870–1907. Sheet XVI 12 Rauma.jpg".
    pub title: String,
}

/// One page of a category listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPage {
    pub members: Vec<MemberRef>,
    /// Token for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

/// File metadata from `prop=imageinfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub page_id: u64,
    pub title: String,
    /// Direct URL of the original upload.
    pub image_url: String,
    /// URL of the file description page.
    pub description_url: String,
}

/// Category summary from `prop=categoryinfo`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryInfo {
    pub found: bool,
    pub file_count: u64,
}

impl CategoryInfo {
    pub fn not_found() -> Self {
        Self {
            found: false,
            file_count: 0,
        }
    }
}

/// Raw wikitext of a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageContent {
    pub found: bool,
    pub raw_content: String,
}

impl PageContent {
    pub fn missing() -> Self {
        Self {
            found: false,
            raw_content: String::new(),
        }
    }
}
