pub mod commons;
pub mod config;
pub mod import;
pub mod store;
pub mod testing;

pub use commons::{
    CategoryInfo, CommonsApi, CommonsClient, CommonsError, FileInfo, MemberPage, MemberRef,
    PageContent,
};
pub use config::{
    load_config, load_config_from_str, validate_config, CommonsConfig, Config, ConfigError,
    DatabaseConfig, ImportConfig,
};
pub use import::{
    CategoryProbe, ImportError, ImportRunner, LayerAssembler, MemberMetadata,
    MemberMetadataFetcher, PagedCategoryLister, RecordReconciler, StartOptions,
};
pub use store::{
    CatalogRecord, CatalogStore, ImportRequest, ImportStatus, ImportStore, Layer, LayerStore,
    MapStatus, MapType, NewImport, NewLayer, RecordStore, SqliteStore, StoreError, User,
    UserStore, NO_LAYER_SENTINEL,
};
