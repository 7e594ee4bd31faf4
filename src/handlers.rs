use crate::config::Config;
use crate::derivation::CapturePointDraft;
use crate::errors::AppError;
use crate::formatting::format_tax_id;
use crate::models::*;
use crate::services::{
    CapturePointService, DashboardCache, DashboardService, EnterpriseService, ReportService,
    UserProfileService,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Dashboard summary per calendar day. Invalidated by every capture point write.
    pub dashboard_cache: DashboardCache,
}

impl AppState {
    fn invalidate_dashboard(&self) {
        self.dashboard_cache.invalidate();
    }
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "capture-points-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Serves the OpenAPI specification (embedded at build time).
pub async fn serve_openapi_spec() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/yaml")],
        include_str!("../openapi.yml"),
    )
}

/// Serves the Swagger UI HTML page, pointed at `serve_openapi_spec`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Capture Points API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

// ============ Capture points ============

/// GET /api/v1/capture-points
///
/// Lists capture points, newest first. `?search=` narrows by name or CNPJ.
pub async fn list_capture_points(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<CapturePointView>>, AppError> {
    tracing::info!("GET /capture-points - search: {:?}", params.search);

    let service = CapturePointService::new(state.db.clone());
    let points = service.list(params.search.as_deref()).await?;

    Ok(Json(points.into_iter().map(CapturePointView::from).collect()))
}

/// GET /api/v1/capture-points/:id
pub async fn get_capture_point(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CapturePointView>, AppError> {
    tracing::info!("GET /capture-points/{}", id);

    let point = CapturePointService::new(state.db.clone()).get(id).await?;
    Ok(Json(CapturePointView::from(point)))
}

/// POST /api/v1/capture-points
///
/// Creates a capture point. Pass-through value, profit margin and end date are
/// computed here from the submitted terms; the CNPJ is stored masked.
///
/// # Returns
///
/// * `201 Created` with the stored point, `400` on invalid input.
pub async fn create_capture_point(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CapturePointInput>,
) -> Result<(StatusCode, Json<CapturePointView>), AppError> {
    tracing::info!("POST /capture-points - name: {}", input.name);

    let point = CapturePointService::new(state.db.clone())
        .create(&input)
        .await?;
    state.invalidate_dashboard();

    Ok((StatusCode::CREATED, Json(CapturePointView::from(point))))
}

/// PUT /api/v1/capture-points/:id
///
/// Replaces a capture point's fields and recomputes its derived fields.
pub async fn update_capture_point(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<CapturePointInput>,
) -> Result<Json<CapturePointView>, AppError> {
    tracing::info!("PUT /capture-points/{}", id);

    let point = CapturePointService::new(state.db.clone())
        .update(id, &input)
        .await?;
    state.invalidate_dashboard();

    Ok(Json(CapturePointView::from(point)))
}

/// DELETE /api/v1/capture-points/:id
pub async fn delete_capture_point(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    tracing::info!("DELETE /capture-points/{}", id);

    CapturePointService::new(state.db.clone()).delete(id).await?;
    state.invalidate_dashboard();

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/capture-points/draft
///
/// Defaults for a new point: today, 12 months, zero values.
pub async fn new_draft(State(state): State<Arc<AppState>>) -> Json<DraftResponse> {
    let draft = CapturePointDraft::new(state.config.today());
    Json(DraftResponse::from(draft))
}

/// POST /api/v1/capture-points/preview
///
/// Recomputes derived and formatted values for the terms currently typed in
/// the form. Nothing is persisted.
pub async fn preview_capture_point(
    Json(request): Json<PreviewRequest>,
) -> Json<DraftResponse> {
    let draft = CapturePointDraft::from_terms((&request).into());
    let mut response = DraftResponse::from(draft);
    response.tax_id = request.tax_id.as_deref().map(format_tax_id);
    Json(response)
}

// ============ Enterprises ============

/// GET /api/v1/enterprises
pub async fn list_enterprises(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Enterprise>>, AppError> {
    let enterprises = EnterpriseService::new(state.db.clone()).list().await?;
    Ok(Json(enterprises))
}

/// GET /api/v1/enterprises/:id
pub async fn get_enterprise(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Enterprise>, AppError> {
    let enterprise = EnterpriseService::new(state.db.clone()).get(id).await?;
    Ok(Json(enterprise))
}

/// POST /api/v1/enterprises
pub async fn create_enterprise(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EnterpriseInput>,
) -> Result<(StatusCode, Json<Enterprise>), AppError> {
    tracing::info!("POST /enterprises - name: {}", input.name);

    let enterprise = EnterpriseService::new(state.db.clone())
        .create(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(enterprise)))
}

// ============ Users ============

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    let users = UserProfileService::new(state.db.clone()).list().await?;
    Ok(Json(users))
}

/// POST /api/v1/users
///
/// Registers the profile of a user already known to the identity provider.
/// A duplicate `uid` answers `409 Conflict`.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UserProfileInput>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    tracing::info!("POST /users - uid: {}", input.uid);

    let user = UserProfileService::new(state.db.clone())
        .create(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/users/:uid/toggle-active
pub async fn toggle_user_active(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    let user = UserProfileService::new(state.db.clone())
        .toggle_active(&uid)
        .await?;
    Ok(Json(user))
}

/// PUT /api/v1/users/:uid/level
pub async fn set_user_level(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(request): Json<SetLevelRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let user = UserProfileService::new(state.db.clone())
        .set_level(&uid, request.level)
        .await?;
    Ok(Json(user))
}

// ============ Dashboard & reports ============

/// GET /api/v1/dashboard
///
/// Totals over active points, contracts expiring soon and the chart series.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>, AppError> {
    let today = state.config.today();
    let service =
        DashboardService::new(&state.config, state.db.clone(), state.dashboard_cache.clone());
    let summary = service.summary(today).await?;

    if summary.expiring_soon > 0 {
        tracing::info!(
            "{} contract(s) expiring in the next {} days",
            summary.expiring_soon,
            summary.expiring_window_days
        );
    }

    Ok(Json(DashboardResponse::new(today, summary)))
}

/// GET /api/v1/reports
///
/// Filtered points with totals and a printable table.
pub async fn report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportResponse>, AppError> {
    tracing::info!("GET /reports - {:?}", query);

    let filter = query.into_filter()?;
    let report = ReportService::new(state.db.clone()).generate(filter).await?;
    Ok(Json(report))
}

/// GET /api/v1/reports/export.csv
///
/// Same filter as `/reports`, downloaded as a CSV attachment.
pub async fn export_report_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;
    let csv = ReportService::new(state.db.clone())
        .export_csv(&filter)
        .await?;

    let disposition = format!(
        "attachment; filename=\"relatorio_{}.csv\"",
        chrono::Utc::now().timestamp_millis()
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// POST /api/v1/reports/snapshots
///
/// Persists the totals of a filtered report.
pub async fn create_report_snapshot(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SnapshotRequest>,
) -> Result<(StatusCode, Json<ReportSnapshot>), AppError> {
    tracing::info!("POST /reports/snapshots - by {}", request.generated_by);

    let snapshot = ReportService::new(state.db.clone())
        .save_snapshot(&request)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/reports/snapshots
pub async fn list_report_snapshots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReportSnapshot>>, AppError> {
    let snapshots = ReportService::new(state.db.clone()).list_snapshots().await?;
    Ok(Json(snapshots))
}
