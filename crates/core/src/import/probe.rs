//! Cheap category checks used before (or instead of) a full import.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::commons::CommonsApi;

/// `{{Map ...}}` or `{{Template:Map ...}}`, any case, possibly spanning lines.
static MAP_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\{\{\s*(?:template:)?map\s*(?:\|.*?)?\}\}").unwrap()
});

/// Members listed when sampling a category for the map template.
const SAMPLE_SIZE: u32 = 2;

/// Read-only category queries. Failures are logged and reported as the
/// "nothing there" answer.
pub struct CategoryProbe {
    api: Arc<dyn CommonsApi>,
}

impl CategoryProbe {
    pub fn new(api: Arc<dyn CommonsApi>) -> Self {
        Self { api }
    }

    /// Number of files in the category; 0 if it does not exist or the
    /// request fails.
    pub async fn file_count(&self, category: &str) -> u64 {
        match self.api.category_info(category).await {
            Ok(info) if info.found => {
                debug!("Category '{}' has {} files", category, info.file_count);
                info.file_count
            }
            Ok(_) => {
                debug!("Category '{}' not found", category);
                0
            }
            Err(e) => {
                warn!("Failed to count files in '{}': {}", category, e);
                0
            }
        }
    }

    /// Whether the first file of the category carries the `{{Map}}`
    /// information template.
    pub async fn has_recognized_map_marker(&self, category: &str) -> bool {
        let page = match self
            .api
            .list_category_members(category, None, SAMPLE_SIZE)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to sample members of '{}': {}", category, e);
                return false;
            }
        };

        let Some(first) = page.members.first() else {
            debug!("Category '{}' has no files to sample", category);
            return false;
        };

        match self.api.page_content(first.page_id).await {
            Ok(content) if content.found => is_map_template(&content.raw_content),
            Ok(_) => {
                debug!("Sample page {} ({}) is missing", first.page_id, first.title);
                false
            }
            Err(e) => {
                warn!(
                    "Failed to read sample page {} of '{}': {}",
                    first.page_id, category, e
                );
                false
            }
        }
    }
}

pub(crate) fn is_map_template(wikitext: &str) -> bool {
    MAP_TEMPLATE.is_match(wikitext)
}
