use capture_points_api::config::Config;
use capture_points_api::db::Database;
use capture_points_api::handlers::AppState;
use capture_points_api::router::{build_app, RateLimit};
use capture_points_api::services::DashboardCache;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and migrations.
/// - Dashboard cache.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capture_points_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // One summary per calendar day; writes invalidate it
    let dashboard_cache = DashboardCache::new(Duration::from_secs(config.dashboard_cache_ttl_secs));
    tracing::info!(
        "Dashboard cache initialized ({}s TTL)",
        config.dashboard_cache_ttl_secs
    );

    let rate_limit = RateLimit {
        per_second: config.rate_limit_per_second,
        burst: config.rate_limit_burst,
    };

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        dashboard_cache,
    });

    let app = build_app(app_state, Some(rate_limit))?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
