//! Shared state for the web server.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::delivery::{ArchiveOptions, DeliveryPipeline};
use crate::registry::CodeRegistry;

/// State handed to every handler.
pub struct AppState {
    /// Live share sessions
    pub registry: Arc<CodeRegistry>,
    /// Where uploads go and downloads come from
    pub store: Arc<dyn BlobStore>,
    /// Download pipeline over the same registry and store
    pub pipeline: DeliveryPipeline,
    /// Key prefix for uploaded objects
    pub folder: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

/// Shared application state.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create state over `registry` and `store`.
    pub fn new(
        registry: Arc<CodeRegistry>,
        store: Arc<dyn BlobStore>,
        archive: ArchiveOptions,
        folder: impl Into<String>,
    ) -> Self {
        let pipeline = DeliveryPipeline::new(Arc::clone(&registry), Arc::clone(&store), archive);
        Self {
            registry,
            store,
            pipeline,
            folder: folder.into(),
        }
    }

    /// Storage key for a new upload.
    pub fn upload_key(&self) -> String {
        let folder = self.folder.trim_matches('/');
        let id = uuid::Uuid::new_v4();
        if folder.is_empty() {
            format!("upload-{id}")
        } else {
            format!("{folder}/upload-{id}")
        }
    }
}
