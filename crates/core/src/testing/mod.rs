//! Testing utilities and mock implementations.
//!
//! This module provides a mock of the Commons API so the import pipeline can
//! be exercised end to end without network access, and a store wrapper that
//! replays insert races between concurrent runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use wikimaps_core::testing::{fixtures, MockCommonsApi};
//!
//! let api = MockCommonsApi::new();
//! api.add_file("Category:Test maps", fixtures::file_info(100, "A.jpg")).await;
//! api.set_page_content(100, fixtures::map_wikitext("A")).await;
//!
//! // Hand `Arc::new(api)` to an ImportRunner...
//! ```

mod mock_commons;
mod racing_store;

pub use mock_commons::{MockCommonsApi, RecordedCommonsQuery};
pub use racing_store::RacingStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::commons::{FileInfo, MemberRef};
    use crate::import::MemberMetadata;

    const UPLOAD_BASE: &str = "https://upload.wikimedia.org/wikipedia/commons";
    const SITE: &str = "https://commons.wikimedia.org";

    fn file_name(name: &str) -> String {
        name.replace(' ', "_")
    }

    /// A category member for `File:<name>`.
    pub fn member(page_id: u64, name: &str) -> MemberRef {
        MemberRef {
            page_id,
            title: format!("File:{}", name),
        }
    }

    /// File metadata for `File:<name>` with Commons-shaped URLs.
    pub fn file_info(page_id: u64, name: &str) -> FileInfo {
        FileInfo {
            page_id,
            title: format!("File:{}", name),
            image_url: format!("{}/{:x}/{}", UPLOAD_BASE, page_id % 16, file_name(name)),
            description_url: format!("{}/wiki/File:{}", SITE, file_name(name)),
        }
    }

    /// Fetched metadata for `File:<name>`, consistent with [`file_info`].
    pub fn member_metadata(page_id: u64, name: &str) -> MemberMetadata {
        let info = file_info(page_id, name);
        MemberMetadata {
            page_id,
            title: info.title,
            file_url: info.image_url,
            description_url: info.description_url,
            unique_id: file_name(name),
        }
    }

    /// File description wikitext using the `{{Map}}` template.
    pub fn map_wikitext(title: &str) -> String {
        format!(
            "=={{{{int:filedesc}}}}==\n{{{{Map\n|title = {}\n|date = 1870\n|scale = 1:21000\n}}}}\n\n[[Category:Senate Atlas]]",
            title
        )
    }
}
