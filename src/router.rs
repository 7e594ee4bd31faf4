use crate::handlers::{self, AppState};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request size limit: 5MB max payload.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Per-IP request budget for the API routes.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub per_second: u64,
    pub burst: u32,
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(handlers::serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(handlers::serve_openapi_spec))
        // Capture points
        .route(
            "/api/v1/capture-points",
            get(handlers::list_capture_points).post(handlers::create_capture_point),
        )
        .route("/api/v1/capture-points/draft", get(handlers::new_draft))
        .route(
            "/api/v1/capture-points/preview",
            post(handlers::preview_capture_point),
        )
        .route(
            "/api/v1/capture-points/:id",
            get(handlers::get_capture_point)
                .put(handlers::update_capture_point)
                .delete(handlers::delete_capture_point),
        )
        // Enterprises
        .route(
            "/api/v1/enterprises",
            get(handlers::list_enterprises).post(handlers::create_enterprise),
        )
        .route("/api/v1/enterprises/:id", get(handlers::get_enterprise))
        // User profiles
        .route(
            "/api/v1/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/v1/users/:uid/toggle-active",
            post(handlers::toggle_user_active),
        )
        .route("/api/v1/users/:uid/level", put(handlers::set_user_level))
        // Dashboard & reports
        .route("/api/v1/dashboard", get(handlers::dashboard))
        .route("/api/v1/reports", get(handlers::report))
        .route(
            "/api/v1/reports/export.csv",
            get(handlers::export_report_csv),
        )
        .route(
            "/api/v1/reports/snapshots",
            get(handlers::list_report_snapshots).post(handlers::create_report_snapshot),
        )
}

/// Builds the application router.
///
/// `/health` bypasses rate limiting. Pass `None` to disable rate limiting
/// entirely (tests, or when a proxy already does it).
pub fn build_app(state: Arc<AppState>, rate_limit: Option<RateLimit>) -> anyhow::Result<Router> {
    let mut protected_routes = api_routes().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    if let Some(limit) = rate_limit {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(limit.per_second)
                .burst_size(limit.burst)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration: {:?}", limit))?,
        );

        protected_routes = protected_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }));
    }

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
