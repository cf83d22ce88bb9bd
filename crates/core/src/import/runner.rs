//! Import run orchestration.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

use super::{
    error_chain, CategoryProbe, ImportError, LayerAssembler, MemberMetadataFetcher,
    PagedCategoryLister, RecordReconciler,
};
use crate::commons::CommonsApi;
use crate::config::{CommonsConfig, ConfigError};
use crate::store::{CatalogStore, ImportRequest, ImportStatus, NewImport, StoreError};

const CATEGORY_PREFIX: &str = "Category:";

/// How a run is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Queued/background execution: the `running` transition is skipped.
    pub fire_and_forget: bool,
    /// Group the imported maps into the layer named after the category.
    pub create_layer: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            fire_and_forget: false,
            create_layer: true,
        }
    }
}

/// Drives an import through probe, listing, reconciliation and layer
/// assembly, and records the outcome on the import.
pub struct ImportRunner {
    store: Arc<dyn CatalogStore>,
    probe: CategoryProbe,
    lister: PagedCategoryLister,
    fetcher: MemberMetadataFetcher,
    reconciler: RecordReconciler,
    assembler: LayerAssembler,
}

impl ImportRunner {
    pub fn new(
        api: Arc<dyn CommonsApi>,
        store: Arc<dyn CatalogStore>,
        config: &CommonsConfig,
    ) -> Result<Self, ConfigError> {
        let site_url = Url::parse(&config.site_url).map_err(|e| {
            ConfigError::ValidationError(format!("commons.site_url is not a valid URL: {}", e))
        })?;

        Ok(Self {
            probe: CategoryProbe::new(api.clone()),
            lister: PagedCategoryLister::new(api.clone(), config.page_size),
            fetcher: MemberMetadataFetcher::new(api),
            reconciler: RecordReconciler::new(store.clone()),
            assembler: LayerAssembler::new(store.clone(), site_url),
            store,
        })
    }

    pub fn probe(&self) -> &CategoryProbe {
        &self.probe
    }

    /// Persist a new import in `ready`.
    pub fn create_import(&self, request: NewImport) -> Result<ImportRequest, ImportError> {
        let import = self.store.create_import(request)?;
        info!("Created import {} for '{}'", import.id, import.category);
        Ok(import)
    }

    /// Check an import's fields, reporting every failing one.
    pub fn validate(&self, import: &ImportRequest) -> Result<(), ImportError> {
        let mut errors = Vec::new();

        if import.category.trim().is_empty() {
            errors.push("category can't be blank".to_string());
        } else if !import.category.starts_with(CATEGORY_PREFIX) {
            errors.push(format!("category must begin with '{}'", CATEGORY_PREFIX));
        }

        if !self.store.user_exists(import.user_id)? {
            errors.push(format!("user {} does not exist", import.user_id));
        }

        if let Some(layer_id) = import.target_layer() {
            if !self.store.layer_exists(layer_id)? {
                errors.push(format!(
                    "layer {} does not exist, or has not been specified properly",
                    layer_id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ImportError::ValidationFailed(errors))
        }
    }

    /// Run an import and return its resulting status.
    ///
    /// Validation failures are returned as errors before any request is
    /// made. A category without files leaves the import untouched. Failures
    /// while importing mark the import `failed` and are returned as
    /// `Ok(ImportStatus::Failed)`; maps reconciled before the failure stay.
    pub async fn start(
        &self,
        import_id: i64,
        options: StartOptions,
    ) -> Result<ImportStatus, ImportError> {
        let import = self
            .store
            .get_import(import_id)?
            .ok_or_else(|| StoreError::NotFound(format!("import {}", import_id)))?;

        let span = info_span!("import", import_id = import.id, category = %import.category);
        self.start_loaded(import, options).instrument(span).await
    }

    async fn start_loaded(
        &self,
        import: ImportRequest,
        options: StartOptions,
    ) -> Result<ImportStatus, ImportError> {
        if let Err(e) = self.validate(&import) {
            warn!("Import rejected: {}", e);
            return Err(e);
        }

        if import.status.is_terminal() {
            warn!("Import already {}, not running it again", import.status);
            return Ok(import.status);
        }

        let file_count = self.probe.file_count(&import.category).await;
        if file_count == 0 {
            info!("No files in category, nothing to import");
            return Ok(import.status);
        }

        if import.status == ImportStatus::Ready && !options.fire_and_forget {
            self.store
                .update_import_status(import.id, ImportStatus::Running, None)?;
        }

        info!("Started import of {} file(s)", file_count);

        match self.execute(&import, options).await {
            Ok(()) => {
                info!("Finished import");
                Ok(ImportStatus::Finished)
            }
            Err(e) => {
                error!("Import failed: {}", error_chain(&e));
                self.store
                    .update_import_status(import.id, ImportStatus::Failed, None)?;
                Ok(ImportStatus::Failed)
            }
        }
    }

    async fn execute(
        &self,
        import: &ImportRequest,
        options: StartOptions,
    ) -> Result<(), ImportError> {
        let members = self.lister.list(&import.category).await?;
        info!("Listed {} member(s)", members.len());

        let mut reconciled = 0usize;
        for member in &members {
            let metadata = self.fetcher.fetch(member).await?;
            let record = self.reconciler.reconcile(import, &metadata)?;
            reconciled += 1;
            debug!(
                "Reconciled {}/{}: map {} ({})",
                reconciled,
                members.len(),
                record.id,
                record.title
            );
        }

        if options.create_layer && reconciled > 0 {
            self.assembler.assemble(import)?;
        } else if !options.create_layer {
            debug!("Layer creation disabled for this run");
        }

        self.store
            .update_import_status(import.id, ImportStatus::Finished, Some(Utc::now()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::CommonsError;
    use crate::store::{
        ImportStore, LayerStore, NewLayer, RecordStore, SqliteStore, UserStore, NO_LAYER_SENTINEL,
    };
    use crate::testing::{fixtures, MockCommonsApi};

    const CATEGORY: &str = "Category:Test maps";

    struct Harness {
        api: Arc<MockCommonsApi>,
        store: Arc<SqliteStore>,
        runner: ImportRunner,
        user_id: i64,
    }

    fn harness() -> Harness {
        let api = Arc::new(MockCommonsApi::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let user_id = store.create_user("alice").unwrap().id;
        let runner =
            ImportRunner::new(api.clone(), store.clone(), &CommonsConfig::default()).unwrap();
        Harness {
            api,
            store,
            runner,
            user_id,
        }
    }

    #[test]
    fn test_new_rejects_bad_site_url() {
        let api = Arc::new(MockCommonsApi::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = CommonsConfig {
            site_url: "commons".to_string(),
            ..CommonsConfig::default()
        };
        assert!(matches!(
            ImportRunner::new(api, store, &config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_accepts_good_import() {
        let h = harness();
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id))
            .unwrap();
        assert!(h.runner.validate(&import).is_ok());

        let sentinel = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id).with_layer(NO_LAYER_SENTINEL))
            .unwrap();
        assert!(h.runner.validate(&sentinel).is_ok());
    }

    #[test]
    fn test_validate_reports_every_field() {
        let h = harness();
        let import = h
            .runner
            .create_import(NewImport::new("Maps of Finland", h.user_id + 1).with_layer(77))
            .unwrap();

        match h.runner.validate(&import) {
            Err(ImportError::ValidationFailed(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors[0].contains("must begin with 'Category:'"));
                assert!(errors[1].contains("does not exist"));
                assert!(errors[2].starts_with("layer 77"));
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_blank_category() {
        let h = harness();
        let import = h.runner.create_import(NewImport::new("", h.user_id)).unwrap();
        match h.runner.validate(&import) {
            Err(ImportError::ValidationFailed(errors)) => {
                assert_eq!(errors, vec!["category can't be blank".to_string()]);
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_existing_layer() {
        let h = harness();
        let layer = h
            .store
            .create_layer(NewLayer {
                name: "Some layer".to_string(),
                user_id: h.user_id,
                source_uri: String::new(),
            })
            .unwrap();
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id).with_layer(layer.id))
            .unwrap();
        assert!(h.runner.validate(&import).is_ok());
    }

    #[tokio::test]
    async fn test_start_unknown_import() {
        let h = harness();
        let result = h.runner.start(404, StartOptions::default()).await;
        assert!(matches!(
            result,
            Err(ImportError::PersistenceFailed(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_start_imports_and_finishes() {
        let h = harness();
        h.api.add_file(CATEGORY, fixtures::file_info(100, "A.jpg")).await;
        h.api.add_file(CATEGORY, fixtures::file_info(200, "B.jpg")).await;
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id))
            .unwrap();

        let status = h.runner.start(import.id, StartOptions::default()).await.unwrap();
        assert_eq!(status, ImportStatus::Finished);

        let stored = h.store.get_import(import.id).unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Finished);
        assert!(stored.finished_at.is_some());
        assert!(stored.layer_id.is_some());
        assert_eq!(h.store.import_records(import.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_without_layer() {
        let h = harness();
        h.api.add_file(CATEGORY, fixtures::file_info(100, "A.jpg")).await;
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id))
            .unwrap();

        let options = StartOptions {
            create_layer: false,
            ..StartOptions::default()
        };
        let status = h.runner.start(import.id, options).await.unwrap();

        assert_eq!(status, ImportStatus::Finished);
        assert!(h.store.find_layer_by_name(CATEGORY).unwrap().is_none());
        assert!(h.store.get_import(import.id).unwrap().unwrap().layer_id.is_none());
        assert_eq!(h.store.count_records().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_terminal_import_is_not_rerun() {
        let h = harness();
        h.api.add_file(CATEGORY, fixtures::file_info(100, "A.jpg")).await;
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id))
            .unwrap();
        h.runner.start(import.id, StartOptions::default()).await.unwrap();
        h.api.clear_recorded().await;

        let status = h.runner.start(import.id, StartOptions::default()).await.unwrap();
        assert_eq!(status, ImportStatus::Finished);
        assert_eq!(h.api.query_count().await, 0);
    }

    #[tokio::test]
    async fn test_failure_in_listing_marks_failed() {
        let h = harness();
        h.api.add_file(CATEGORY, fixtures::file_info(100, "A.jpg")).await;
        // Call 0 is the file count probe, call 1 the first listing page.
        h.api
            .fail_call(1, CommonsError::Parse("truncated body".to_string()))
            .await;
        let import = h
            .runner
            .create_import(NewImport::new(CATEGORY, h.user_id))
            .unwrap();

        let status = h.runner.start(import.id, StartOptions::default()).await.unwrap();
        assert_eq!(status, ImportStatus::Failed);

        let stored = h.store.get_import(import.id).unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
        assert!(stored.finished_at.is_none());
        assert_eq!(h.store.count_records().unwrap(), 0);
    }
}
