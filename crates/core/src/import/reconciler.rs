//! Create-or-relink of local map records.

use std::sync::Arc;

use tracing::debug;

use super::{ImportError, MemberMetadata};
use crate::store::{
    CatalogRecord, CatalogStore, ImportRequest, MapStatus, MapType, NewCatalogRecord, StoreError,
};

/// Makes sure exactly one map exists for a member and links it to the import.
pub struct RecordReconciler {
    store: Arc<dyn CatalogStore>,
}

impl RecordReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Link the member's map to `import`, creating the map if this page id
    /// has never been catalogued.
    ///
    /// An existing map is re-associated with the current import, replacing
    /// whatever import it belonged to before.
    pub fn reconcile(
        &self,
        import: &ImportRequest,
        metadata: &MemberMetadata,
    ) -> Result<CatalogRecord, ImportError> {
        if let Some(existing) = self.store.find_record_by_page_id(metadata.page_id)? {
            debug!(
                "Map {} already exists for page {}, relinking to import {}",
                existing.id, metadata.page_id, import.id
            );
            return Ok(self.store.relink_record(existing.id, import.id)?);
        }

        match self.store.create_record(new_record(import, metadata)) {
            Ok(record) => {
                debug!("Created map {} for page {}", record.id, metadata.page_id);
                Ok(record)
            }
            Err(StoreError::Conflict(_)) => {
                // Another run catalogued the page between lookup and insert.
                let existing = self
                    .store
                    .find_record_by_page_id(metadata.page_id)?
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("map for page {}", metadata.page_id))
                    })?;
                Ok(self.store.relink_record(existing.id, import.id)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn new_record(import: &ImportRequest, metadata: &MemberMetadata) -> NewCatalogRecord {
    NewCatalogRecord {
        page_id: metadata.page_id,
        title: metadata.title.clone(),
        unique_id: metadata.unique_id.clone(),
        description: format!("From: {}", metadata.description_url),
        source_uri: metadata.description_url.clone(),
        upload_url: metadata.file_url.clone(),
        image_url: metadata.file_url.clone(),
        public: true,
        map_type: MapType::IsMap,
        status: MapStatus::Unloaded,
        import_id: import.id,
        owner_id: import.user_id,
    }
}
