//! Store wrapper that simulates a concurrent run winning an insert race.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};

use crate::store::{
    CatalogRecord, ImportRequest, ImportStatus, ImportStore, Layer, LayerStore, NewCatalogRecord,
    NewImport, NewLayer, RecordStore, SqliteStore, StoreError, User, UserStore,
};

/// Delegates to an in-memory [`SqliteStore`], except that a configured
/// number of record or layer lookups report "not found".
///
/// Hiding a lookup and then creating the same entity through `inner()`
/// reproduces the window between another run's lookup and its insert.
pub struct RacingStore {
    inner: SqliteStore,
    hidden_record_lookups: AtomicU32,
    hidden_layer_lookups: AtomicU32,
}

impl RacingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            hidden_record_lookups: AtomicU32::new(0),
            hidden_layer_lookups: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    /// The next `n` `find_record_by_page_id` calls return `None`.
    pub fn hide_record_lookups(&self, n: u32) {
        self.hidden_record_lookups.store(n, Ordering::SeqCst);
    }

    /// The next `n` `find_layer_by_name` calls return `None`.
    pub fn hide_layer_lookups(&self, n: u32) {
        self.hidden_layer_lookups.store(n, Ordering::SeqCst);
    }

    fn take_hidden(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ImportStore for RacingStore {
    fn create_import(&self, request: NewImport) -> Result<ImportRequest, StoreError> {
        self.inner.create_import(request)
    }

    fn get_import(&self, id: i64) -> Result<Option<ImportRequest>, StoreError> {
        self.inner.get_import(id)
    }

    fn update_import_status(
        &self,
        id: i64,
        status: ImportStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<ImportRequest, StoreError> {
        self.inner.update_import_status(id, status, finished_at)
    }

    fn set_import_layer(&self, id: i64, layer_id: i64) -> Result<ImportRequest, StoreError> {
        self.inner.set_import_layer(id, layer_id)
    }

    fn import_records(&self, id: i64) -> Result<Vec<CatalogRecord>, StoreError> {
        self.inner.import_records(id)
    }
}

impl RecordStore for RacingStore {
    fn find_record_by_page_id(&self, page_id: u64) -> Result<Option<CatalogRecord>, StoreError> {
        if Self::take_hidden(&self.hidden_record_lookups) {
            return Ok(None);
        }
        self.inner.find_record_by_page_id(page_id)
    }

    fn create_record(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError> {
        self.inner.create_record(record)
    }

    fn relink_record(&self, record_id: i64, import_id: i64) -> Result<CatalogRecord, StoreError> {
        self.inner.relink_record(record_id, import_id)
    }

    fn count_records(&self) -> Result<u64, StoreError> {
        self.inner.count_records()
    }
}

impl LayerStore for RacingStore {
    fn find_layer_by_name(&self, name: &str) -> Result<Option<Layer>, StoreError> {
        if Self::take_hidden(&self.hidden_layer_lookups) {
            return Ok(None);
        }
        self.inner.find_layer_by_name(name)
    }

    fn layer_exists(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.layer_exists(id)
    }

    fn create_layer(&self, layer: NewLayer) -> Result<Layer, StoreError> {
        self.inner.create_layer(layer)
    }

    fn layer_members(&self, layer_id: i64) -> Result<Vec<i64>, StoreError> {
        self.inner.layer_members(layer_id)
    }

    fn append_layer_members(&self, layer_id: i64, record_ids: &[i64]) -> Result<(), StoreError> {
        self.inner.append_layer_members(layer_id, record_ids)
    }
}

impl UserStore for RacingStore {
    fn create_user(&self, login: &str) -> Result<User, StoreError> {
        self.inner.create_user(login)
    }

    fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_login(login)
    }

    fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.user_exists(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_lookups_are_consumed() {
        let store = RacingStore::new(SqliteStore::in_memory().unwrap());
        let user = store.create_user("alice").unwrap();
        store
            .create_layer(NewLayer {
                name: "Category:X".to_string(),
                user_id: user.id,
                source_uri: String::new(),
            })
            .unwrap();

        store.hide_layer_lookups(1);
        assert!(store.find_layer_by_name("Category:X").unwrap().is_none());
        assert!(store.find_layer_by_name("Category:X").unwrap().is_some());
    }
}
