// HTTP API module
//
// Route groups:
//   aggregate - cross-provider views (classify, videos, detail, playurl, search, import)
//   spiders   - provider management (add, upload, rename, delete, reload, enable, list)
//   protocol  - raw TVBox protocol per provider, plus its byte proxy
//   health    - root banner and health probe

pub mod aggregate;
pub mod envelope;
pub mod error;
pub mod health;
pub mod protocol;
pub mod spiders;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use spiderhub_core::{
    bootstrap::Services, config::ProvidersConfig, dispatch::Dispatcher,
    importer::ConfigImporter, provider::ProviderRegistry,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use envelope::Envelope;
pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub dispatcher: Dispatcher,
    pub importer: Arc<ConfigImporter>,
    pub providers: Arc<ProvidersConfig>,
    pub uploads: spiders::UploadSlots,
}

impl AppState {
    pub fn new(services: Services, providers: ProvidersConfig) -> Self {
        Self {
            registry: services.registry,
            dispatcher: services.dispatcher,
            importer: services.importer,
            providers: Arc::new(providers),
            uploads: spiders::UploadSlots::default(),
        }
    }
}

/// Routes served under the configured base path
fn api_routes() -> Router<AppState> {
    Router::new()
        // Aggregate views
        .route("/classify", get(aggregate::classify))
        .route("/videos", get(aggregate::videos))
        .route("/detail", get(aggregate::detail))
        .route("/playurl", get(aggregate::play_url))
        .route("/search", get(aggregate::search))
        .route("/import-tvbox-config", post(aggregate::import_tvbox_config))
        // Provider management
        .route("/add-python-spider", post(spiders::add_python_spider))
        .route("/spiders", get(spiders::list_spiders))
        .route("/spiders/upload", post(spiders::upload_spider))
        .route(
            "/spiders/{key}",
            put(spiders::update_spider).delete(spiders::delete_spider),
        )
        .route("/spiders/{key}/reload", post(spiders::reload_spider))
        .route("/spiders/{key}/enable", post(spiders::enable_spider))
        .route("/spiders/{key}/disable", post(spiders::disable_spider))
        // TVBox protocol
        .route("/spider/{key}", get(protocol::spider_api))
        .route("/spider/{key}/proxy", get(protocol::spider_proxy))
}

/// Build the HTTP router; API routes are nested under `base_path`
pub fn create_router(state: AppState, base_path: &str) -> Router {
    let base_path = base_path.trim_end_matches('/');
    let router = if base_path.is_empty() {
        // axum does not nest at the root
        api_routes().merge(health::create_health_router())
    } else {
        Router::new()
            .nest(base_path, api_routes())
            .merge(health::create_health_router())
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
