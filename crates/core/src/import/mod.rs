//! Category import pipeline.
//!
//! An import runs these stages in order:
//! - **Probe**: category file count (zero means nothing to do)
//! - **List**: page through the category's file members
//! - **Fetch + reconcile**: per member, fetch file metadata and create or
//!   re-link the local map record
//! - **Assemble**: create or extend the layer named after the category

mod fetcher;
mod layer;
mod lister;
mod probe;
mod reconciler;
mod runner;

pub use fetcher::{MemberMetadata, MemberMetadataFetcher};
pub use layer::LayerAssembler;
pub use lister::PagedCategoryLister;
pub use probe::CategoryProbe;
pub use reconciler::RecordReconciler;
pub use runner::{ImportRunner, StartOptions};

use thiserror::Error;

use crate::commons::CommonsError;
use crate::store::StoreError;

/// Errors raised while running an import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The import failed validation; one message per failing field.
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// A Commons request failed. `context` names the request.
    #[error("Fetch failed: {context}")]
    FetchFailed {
        context: String,
        #[source]
        source: CommonsError,
    },

    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),
}

impl ImportError {
    pub(crate) fn fetch(context: impl Into<String>, source: CommonsError) -> Self {
        ImportError::FetchFailed {
            context: context.into(),
            source,
        }
    }
}

/// Render an error and its source chain on one line.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
