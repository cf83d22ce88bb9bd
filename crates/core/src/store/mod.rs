//! Persistence for imports, catalog records (maps), layers and users.
//!
//! The host application owns these entities; the traits are the slice of
//! its persistence layer the import pipeline needs. `SqliteStore` implements
//! all of them over one database.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid status transition for import {import_id}: {from} -> {to}")]
    InvalidTransition {
        import_id: i64,
        from: ImportStatus,
        to: ImportStatus,
    },
}

/// Import persistence.
pub trait ImportStore: Send + Sync {
    /// Create a new import in `Ready`.
    fn create_import(&self, request: NewImport) -> Result<ImportRequest, StoreError>;

    /// Get an import by ID.
    fn get_import(&self, id: i64) -> Result<Option<ImportRequest>, StoreError>;

    /// Move an import to `status`, rejecting illegal transitions.
    fn update_import_status(
        &self,
        id: i64,
        status: ImportStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<ImportRequest, StoreError>;

    /// Point an import at the layer its maps were grouped into.
    fn set_import_layer(&self, id: i64, layer_id: i64) -> Result<ImportRequest, StoreError>;

    /// Records currently associated with an import, in link order.
    fn import_records(&self, id: i64) -> Result<Vec<CatalogRecord>, StoreError>;
}

/// Catalog record persistence.
pub trait RecordStore: Send + Sync {
    fn find_record_by_page_id(&self, page_id: u64) -> Result<Option<CatalogRecord>, StoreError>;

    /// Insert a record, its owner as first collaborator, and link it to its
    /// import. Returns `Conflict` if the page id is already catalogued.
    fn create_record(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError>;

    /// Re-associate an existing record with `import_id`.
    fn relink_record(&self, record_id: i64, import_id: i64) -> Result<CatalogRecord, StoreError>;

    fn count_records(&self) -> Result<u64, StoreError>;
}

/// Layer persistence.
pub trait LayerStore: Send + Sync {
    fn find_layer_by_name(&self, name: &str) -> Result<Option<Layer>, StoreError>;

    fn layer_exists(&self, id: i64) -> Result<bool, StoreError>;

    /// Returns `Conflict` if a layer with the same name exists.
    fn create_layer(&self, layer: NewLayer) -> Result<Layer, StoreError>;

    /// Member record ids, in membership order.
    fn layer_members(&self, layer_id: i64) -> Result<Vec<i64>, StoreError>;

    /// Append records to the end of a layer. Existing members are untouched.
    fn append_layer_members(&self, layer_id: i64, record_ids: &[i64]) -> Result<(), StoreError>;
}

/// User lookup. Accounts are managed by the host application.
pub trait UserStore: Send + Sync {
    fn create_user(&self, login: &str) -> Result<User, StoreError>;

    fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    fn user_exists(&self, id: i64) -> Result<bool, StoreError>;
}

/// Everything the import pipeline needs from persistence.
pub trait CatalogStore: ImportStore + RecordStore + LayerStore + UserStore {}

impl<T> CatalogStore for T where T: ImportStore + RecordStore + LayerStore + UserStore {}
