//! Grouping an import's maps into the layer named after its category.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::ImportError;
use crate::store::{CatalogStore, ImportRequest, Layer, NewLayer, StoreError};

/// Creates or extends the layer for an import.
pub struct LayerAssembler {
    store: Arc<dyn CatalogStore>,
    site_url: Url,
}

impl LayerAssembler {
    pub fn new(store: Arc<dyn CatalogStore>, site_url: Url) -> Self {
        Self { store, site_url }
    }

    /// Make every map of `import` a member of the layer named after its
    /// category, then point the import at that layer.
    ///
    /// Existing members keep their order; new ones are appended in the
    /// order the import linked them. A map can belong to one layer only, so
    /// maps already grouped elsewhere are moved.
    pub fn assemble(&self, import: &ImportRequest) -> Result<Layer, ImportError> {
        let records = self.store.import_records(import.id)?;

        let layer = match self.store.find_layer_by_name(&import.category)? {
            Some(layer) => layer,
            None => self.create_layer(import)?,
        };

        let members: HashSet<i64> = self.store.layer_members(layer.id)?.into_iter().collect();
        let additions: Vec<i64> = records
            .iter()
            .filter(|r| !members.contains(&r.id))
            .map(|r| {
                if let Some(previous) = r.layer_id {
                    warn!(
                        "Moving map {} ({}) from layer {} to layer {} '{}'",
                        r.id, r.title, previous, layer.id, layer.name
                    );
                }
                r.id
            })
            .collect();

        if additions.is_empty() {
            debug!("Layer {} already holds all {} maps", layer.id, records.len());
        } else {
            self.store.append_layer_members(layer.id, &additions)?;
            info!(
                "Added {} map(s) to layer {} '{}'",
                additions.len(),
                layer.id,
                layer.name
            );
        }

        self.store.set_import_layer(import.id, layer.id)?;
        Ok(layer)
    }

    fn create_layer(&self, import: &ImportRequest) -> Result<Layer, ImportError> {
        let new_layer = NewLayer {
            name: import.category.clone(),
            user_id: import.user_id,
            source_uri: layer_source_uri(&self.site_url, &import.category),
        };

        match self.store.create_layer(new_layer) {
            Ok(layer) => {
                info!("Created layer {} '{}'", layer.id, layer.name);
                Ok(layer)
            }
            Err(StoreError::Conflict(_)) => self
                .store
                .find_layer_by_name(&import.category)?
                .ok_or_else(|| StoreError::NotFound(format!("layer '{}'", import.category)).into()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `<site>/wiki/<category>` with spaces as underscores, path-encoded.
pub(crate) fn layer_source_uri(site_url: &Url, category: &str) -> String {
    let mut url = site_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .push("wiki")
            .push(&category.replace(' ', "_"));
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::RecordReconciler;
    use crate::store::{ImportStore, LayerStore, NewImport, SqliteStore, UserStore};
    use crate::testing::{fixtures, RacingStore};

    fn site() -> Url {
        Url::parse("https://commons.wikimedia.org").unwrap()
    }

    fn setup() -> (Arc<SqliteStore>, ImportRequest) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let user = store.create_user("alice").unwrap();
        let import = store
            .create_import(NewImport::new("Category:Maps of Finland", user.id))
            .unwrap();
        (store, import)
    }

    #[test]
    fn test_source_uri() {
        assert_eq!(
            layer_source_uri(&site(), "Category:Maps of Finland"),
            "https://commons.wikimedia.org/wiki/Category:Maps_of_Finland"
        );
        assert_eq!(
            layer_source_uri(&site(), "Category:Kartat Åbo"),
            "https://commons.wikimedia.org/wiki/Category:Kartat_%C3%85bo"
        );
    }

    #[test]
    fn test_source_uri_keeps_site_path() {
        let site = Url::parse("https://maps.example.org/commons/").unwrap();
        assert_eq!(
            layer_source_uri(&site, "Category:X"),
            "https://maps.example.org/commons/wiki/Category:X"
        );
    }

    #[test]
    fn test_creates_layer_with_all_records() {
        let (store, import) = setup();
        let reconciler = RecordReconciler::new(store.clone());
        let a = reconciler
            .reconcile(&import, &fixtures::member_metadata(1, "A.jpg"))
            .unwrap();
        let b = reconciler
            .reconcile(&import, &fixtures::member_metadata(2, "B.jpg"))
            .unwrap();

        let assembler = LayerAssembler::new(store.clone(), site());
        let layer = assembler.assemble(&import).unwrap();

        assert_eq!(layer.name, "Category:Maps of Finland");
        assert_eq!(layer.user_id, import.user_id);
        assert_eq!(
            layer.source_uri,
            "https://commons.wikimedia.org/wiki/Category:Maps_of_Finland"
        );
        assert_eq!(store.layer_members(layer.id).unwrap(), vec![a.id, b.id]);
        assert_eq!(
            store.get_import(import.id).unwrap().unwrap().layer_id,
            Some(layer.id)
        );
    }

    #[test]
    fn test_merges_into_existing_layer() {
        let (store, first) = setup();
        let reconciler = RecordReconciler::new(store.clone());
        let assembler = LayerAssembler::new(store.clone(), site());

        let a = reconciler
            .reconcile(&first, &fixtures::member_metadata(1, "A.jpg"))
            .unwrap();
        let b = reconciler
            .reconcile(&first, &fixtures::member_metadata(2, "B.jpg"))
            .unwrap();
        let layer = assembler.assemble(&first).unwrap();

        let second = store
            .create_import(NewImport::new("Category:Maps of Finland", first.user_id))
            .unwrap();
        reconciler
            .reconcile(&second, &fixtures::member_metadata(2, "B.jpg"))
            .unwrap();
        let c = reconciler
            .reconcile(&second, &fixtures::member_metadata(3, "C.jpg"))
            .unwrap();
        let merged = assembler.assemble(&second).unwrap();

        assert_eq!(merged.id, layer.id);
        assert_eq!(store.layer_members(layer.id).unwrap(), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let (store, import) = setup();
        let reconciler = RecordReconciler::new(store.clone());
        reconciler
            .reconcile(&import, &fixtures::member_metadata(1, "A.jpg"))
            .unwrap();

        let assembler = LayerAssembler::new(store.clone(), site());
        let layer = assembler.assemble(&import).unwrap();
        assembler.assemble(&import).unwrap();

        assert_eq!(store.layer_members(layer.id).unwrap().len(), 1);
    }

    #[test]
    fn test_maps_move_out_of_their_previous_layer() {
        let (store, first) = setup();
        let user_id = first.user_id;
        let reconciler = RecordReconciler::new(store.clone());
        let assembler = LayerAssembler::new(store.clone(), site());

        let a = reconciler
            .reconcile(&first, &fixtures::member_metadata(1, "A.jpg"))
            .unwrap();
        let b = reconciler
            .reconcile(&first, &fixtures::member_metadata(2, "B.jpg"))
            .unwrap();
        let finland = assembler.assemble(&first).unwrap();

        let second = store
            .create_import(NewImport::new("Category:Maps of Turku", user_id))
            .unwrap();
        reconciler
            .reconcile(&second, &fixtures::member_metadata(2, "B.jpg"))
            .unwrap();
        let c = reconciler
            .reconcile(&second, &fixtures::member_metadata(3, "C.jpg"))
            .unwrap();
        let turku = assembler.assemble(&second).unwrap();

        assert_ne!(turku.id, finland.id);
        assert_eq!(store.layer_members(finland.id).unwrap(), vec![a.id]);
        assert_eq!(store.layer_members(turku.id).unwrap(), vec![b.id, c.id]);
    }

    #[test]
    fn test_concurrent_layer_create_reuses_winner() {
        let store = Arc::new(RacingStore::new(SqliteStore::in_memory().unwrap()));
        let user = store.create_user("alice").unwrap();
        let import = store
            .create_import(NewImport::new("Category:Maps of Finland", user.id))
            .unwrap();
        let record = RecordReconciler::new(store.clone())
            .reconcile(&import, &fixtures::member_metadata(1, "A.jpg"))
            .unwrap();

        // Another run creates the layer after our lookup missed it.
        let theirs = store
            .inner()
            .create_layer(NewLayer {
                name: "Category:Maps of Finland".to_string(),
                user_id: user.id,
                source_uri: String::new(),
            })
            .unwrap();
        store.hide_layer_lookups(1);

        let ours = LayerAssembler::new(store.clone(), site())
            .assemble(&import)
            .unwrap();

        assert_eq!(ours.id, theirs.id);
        assert_eq!(store.layer_members(theirs.id).unwrap(), vec![record.id]);
        assert_eq!(
            store.get_import(import.id).unwrap().unwrap().layer_id,
            Some(theirs.id)
        );
    }
}
