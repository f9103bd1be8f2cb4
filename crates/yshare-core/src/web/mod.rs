//! HTTP server for Y-Share.
//!
//! | Method | Path              | Purpose                                  |
//! |--------|-------------------|------------------------------------------|
//! | GET    | `/`               | Embedded send/receive page               |
//! | POST   | `/send`           | Multipart upload (`file`, repeatable)    |
//! | POST   | `/receive`        | Form field `code`, responds with files   |
//! | GET    | `/download/{code}`| Same as `/receive`                       |
//! | GET    | `/health`         | Liveness and live share count            |

pub mod assets;
pub mod error;
pub mod handlers;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::config::{Config, StorageBackend, StorageConfig};
use crate::error::{Error, Result};
use crate::registry::CodeRegistry;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, SharedState};

/// Build the router over `state`.
///
/// Request bodies above `max_upload_size` bytes are rejected with 413.
pub fn router(state: SharedState, max_upload_size: usize) -> Router {
    Router::new()
        .route("/send", post(handlers::create_share))
        .route("/receive", post(handlers::receive))
        .route("/download/{code}", get(handlers::download))
        .route("/health", get(handlers::health))
        .fallback(assets::serve_static_fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the blob store described by `config`.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; uploads are lost on restart");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
        #[cfg(feature = "http-store")]
        StorageBackend::Http => {
            let base_url = config.base_url.clone().ok_or_else(|| Error::InvalidConfig {
                key: "storage.base_url".to_string(),
                reason: "required for the http backend".to_string(),
            })?;
            let store = crate::blob::HttpBlobStore::new(base_url, config.token.clone())?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "http-store"))]
        StorageBackend::Http => Err(Error::InvalidConfig {
            key: "storage.backend".to_string(),
            reason: "built without the http-store feature".to_string(),
        }),
    }
}

/// The Y-Share web server.
#[derive(Debug)]
pub struct WebServer {
    config: Config,
    state: SharedState,
}

impl WebServer {
    /// Create a server with the store named in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let store = build_store(&config.storage)?;
        Ok(Self::with_store(config, store))
    }

    /// Create a server over an existing store.
    pub fn with_store(config: Config, store: Arc<dyn BlobStore>) -> Self {
        let registry = CodeRegistry::new((&config.session).into());
        let state = Arc::new(AppState::new(
            registry,
            store,
            (&config.delivery).into(),
            config.storage.folder.clone(),
        ));
        Self { config, state }
    }

    /// Shared state, for inspection.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// The router this server runs.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state), self.config.server.max_upload_size)
    }

    /// Bind the configured address and serve until `shutdown` completes.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!("Y-Share server running on port {}", addr.port());
        tracing::debug!("Listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!(
            "Server stopped with {} live share(s) discarded",
            self.state.registry.len()
        );
        Ok(())
    }
}
