use crate::config::{InvoicingConfig, StorageBackend, StoreConfig};
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::rendering::{ChromeBrowser, DocumentRenderer, HeadlessBrowser};
use crate::services::publisher::ARTIFACT_PREFIX;
use crate::services::{
    AccountService, ArtifactPublisher, Database, InvoiceRepository, InvoiceService, LocalStorage,
    MemoryStore, S3Storage, Storage,
};
use axum::{
    body::Body,
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::future::{Future, IntoFuture};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn InvoiceRepository>,
    pub invoices: InvoiceService,
    pub accounts: AccountService,
    /// Directory the published artifacts are served from. `None` when
    /// artifacts live in a bucket that serves them itself.
    pub artifact_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn InvoiceRepository>,
        renderer: DocumentRenderer,
        publisher: ArtifactPublisher,
        local_root: Option<PathBuf>,
    ) -> Self {
        let accounts = AccountService::new(repo.clone(), renderer.registry().clone());
        let invoices = InvoiceService::new(repo.clone(), renderer, publisher);
        Self {
            repo,
            invoices,
            accounts,
            artifact_dir: local_root.map(|root| root.join(ARTIFACT_PREFIX)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/invoices/preview", post(handlers::preview_invoice))
        .route("/invoices/bulk", post(handlers::bulk_invoices))
        .route(
            "/invoices",
            post(handlers::create_invoice).get(handlers::list_invoices),
        )
        .route(
            "/invoices/:id",
            get(handlers::get_invoice)
                .put(handlers::update_invoice)
                .patch(handlers::record_payment)
                .delete(handlers::delete_invoice),
        )
        .route("/invoices/:id/artifacts", post(handlers::render_artifact))
        .route("/line-items/suggestions", get(handlers::suggest_line_items))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/templates", get(handlers::list_templates))
        .route("/templates/unlock", post(handlers::unlock_template))
        .route("/templates/active", put(handlers::set_active_template))
        .route("/templates/:name", delete(handlers::remove_template));

    if let Some(dir) = &state.artifact_dir {
        router = router.nest_service("/artifacts", ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(from_fn(http_metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

pub struct Application {
    port: u16,
    server: Box<dyn Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(
        config: InvoicingConfig,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<Self, AppError> {
        let repo: Arc<dyn InvoiceRepository> = match &config.store {
            StoreConfig::Postgres(db) => {
                let database =
                    Database::new(&db.url, db.max_connections, db.min_connections)
                        .await
                        .map_err(|e| {
                            tracing::error!("Failed to connect to PostgreSQL: {}", e);
                            e
                        })?;
                database.run_migrations().await?;
                Arc::new(database)
            }
            StoreConfig::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let (storage, local_root): (Arc<dyn Storage>, Option<PathBuf>) =
            match config.storage.backend {
                StorageBackend::Local => {
                    let storage = LocalStorage::new(&config.storage.local_path)
                        .await
                        .map_err(|e| {
                            tracing::error!(
                                "Failed to initialize local storage at {}: {}",
                                config.storage.local_path,
                                e
                            );
                            e
                        })?;
                    let root = storage.base_path().to_path_buf();
                    (Arc::new(storage), Some(root))
                }
                StorageBackend::S3 => {
                    let storage = S3Storage::from_env(
                        config.storage.require_bucket()?,
                        config.storage.s3_region.clone(),
                        config.storage.s3_endpoint.clone(),
                    )
                    .await;
                    tracing::info!(bucket = storage.bucket(), "Publishing artifacts to S3");
                    (Arc::new(storage), None)
                }
            };

        let browser: Arc<dyn HeadlessBrowser> = Arc::new(ChromeBrowser::new(
            &config.renderer.chrome_path,
            config.renderer.timeout,
            config.renderer.settle,
        ));
        let renderer = DocumentRenderer::new(
            browser,
            config.templates.registry(),
            &config.renderer.font_url,
        );
        let publisher = ArtifactPublisher::new(storage, &config.storage.public_base_url);

        let default_template = renderer.registry().default_kind();
        let state = AppState::new(repo, renderer, publisher, local_root);
        let app = build_router(state);

        let addr = config.common.bind_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            environment = %config.environment,
            default_template = default_template.as_str(),
            "Listening"
        );

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
