mod config;
mod metrics;
mod models;
mod routes;
mod services;
mod sources;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    cleanup::{start_cleanup_task, CleanupConfig},
    CatalogService, ChannelService, ChannelSettings, Clock, GuideService, HttpFetcher,
    SourceFetch, SystemClock,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub channels: ChannelService,
    pub guides: GuideService,
    pub catalog: CatalogService,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autv_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let port = config.port;
    let host = config.host.clone();

    tracing::info!("Starting AUTV Server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize services
    let fetch: Arc<dyn SourceFetch> =
        Arc::new(HttpFetcher::new(&config.user_agent, config.fetch_retries)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let channels = ChannelService::new(
        Arc::clone(&fetch),
        Arc::clone(&clock),
        ChannelSettings {
            playlist_ttl_ms: config.playlist_ttl_ms,
            curated_ttl_ms: config.curated_ttl_ms,
            extras_ttl_ms: config.extras_ttl_ms,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            extras_url: config.extras_url.clone(),
        },
    );
    let guides = GuideService::new(
        Arc::clone(&fetch),
        Arc::clone(&clock),
        config.guide_ttl_ms,
        Duration::from_millis(config.guide_timeout_ms),
    );
    let catalog = CatalogService::new(
        channels.clone(),
        guides.clone(),
        Arc::clone(&clock),
        Duration::from_millis(config.catalog_guide_soft_timeout_ms),
    );
    tracing::info!("Services initialized");

    // Start cleanup task (runs in background)
    tokio::spawn(start_cleanup_task(
        channels.clone(),
        guides.clone(),
        CleanupConfig {
            interval_secs: config.cleanup_interval_secs,
        },
    ));

    // Build application state
    let state = Arc::new(AppState {
        config,
        channels,
        guides,
        catalog,
        start_time: Instant::now(),
    });

    // Build router
    let app = Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Addon resources
        .route("/manifest.json", get(routes::addon::manifest))
        .route("/catalog/tv/:catalog_id", get(routes::addon::catalog))
        .route(
            "/catalog/tv/:catalog_id/:extra",
            get(routes::addon::catalog_with_extra),
        )
        .route("/meta/tv/:meta_id", get(routes::addon::meta))
        .route("/stream/tv/:meta_id", get(routes::addon::stream))
        // Admin endpoints (protected by ADMIN_KEY)
        .route(
            "/api/admin/guide-cache",
            delete(routes::admin::clear_guide_cache),
        )
        .route(
            "/api/admin/guide/prewarm",
            post(routes::admin::prewarm_guide),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
