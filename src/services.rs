use crate::config::Config;
use crate::derivation::derive_fields;
use crate::errors::AppError;
use crate::formatting::format_tax_id;
use crate::models::*;
use crate::reports::{
    compute_totals, export_rows, filter_points, render_csv, report_table, search_points,
    summarize_dashboard, DashboardSummary, ReportFilter,
};
use crate::storage::{CapturePointStore, EnterpriseStore, ReportSnapshotStore, UserProfileStore};
use crate::validation::{is_valid_email, require_complete_tax_id, require_text};
use chrono::{Datelike, NaiveDate};
use moka::future::Cache;
use sqlx::PgPool;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Longest contract accepted in either direction (100 years).
pub const MAX_CONTRACT_MONTHS: i32 = 1200;

/// Validates a capture point payload and derives its computed fields.
///
/// The tax id is stored masked; derived fields always come from the inputs.
pub fn build_point_fields(input: &CapturePointInput) -> Result<CapturePointFields, AppError> {
    let name = require_text("name", &input.name)?;
    let address = require_text("address", &input.address)?;
    let responsible = require_text("responsible", &input.responsible)?;
    require_complete_tax_id(&input.tax_id)?;

    if input.enterprise_id.is_nil() {
        return Err(AppError::BadRequest("enterprise_id is required".to_string()));
    }

    if !(-MAX_CONTRACT_MONTHS..=MAX_CONTRACT_MONTHS).contains(&input.contract_duration_months) {
        return Err(AppError::BadRequest(format!(
            "contract_duration_months must be between -{} and {}",
            MAX_CONTRACT_MONTHS, MAX_CONTRACT_MONTHS
        )));
    }

    if !(1..=9999).contains(&input.start_date.year()) {
        return Err(AppError::BadRequest(
            "start_date must fall between years 1 and 9999".to_string(),
        ));
    }

    let terms = input.terms();
    let derived = derive_fields(&terms);

    Ok(CapturePointFields {
        name,
        tax_id: format_tax_id(&input.tax_id),
        address,
        enterprise_id: input.enterprise_id,
        responsible,
        real_value: input.real_value.clone(),
        terms,
        derived,
        status: input.status,
    })
}

pub struct CapturePointService {
    points: CapturePointStore,
    enterprises: EnterpriseStore,
}

impl CapturePointService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            points: CapturePointStore::new(pool.clone()),
            enterprises: EnterpriseStore::new(pool),
        }
    }

    /// Points newest first, optionally narrowed by name/CNPJ search
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<CapturePoint>, AppError> {
        let points = self.points.list().await?;
        Ok(match search {
            Some(term) => search_points(&points, term),
            None => points,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<CapturePoint, AppError> {
        self.points.get(id).await
    }

    pub async fn create(&self, input: &CapturePointInput) -> Result<CapturePoint, AppError> {
        let fields = self.prepare(input).await?;
        let point = self.points.insert(&fields).await?;
        tracing::info!(
            "Created capture point {} ({}), ends {}",
            point.id,
            point.name,
            point.end_date
        );
        Ok(point)
    }

    pub async fn update(
        &self,
        id: Uuid,
        input: &CapturePointInput,
    ) -> Result<CapturePoint, AppError> {
        let fields = self.prepare(input).await?;
        let point = self.points.update(id, &fields).await?;
        tracing::info!("Updated capture point {} ({})", point.id, point.name);
        Ok(point)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.points.delete(id).await?;
        tracing::info!("Deleted capture point {}", id);
        Ok(())
    }

    async fn prepare(&self, input: &CapturePointInput) -> Result<CapturePointFields, AppError> {
        let fields = build_point_fields(input)?;

        if !self.enterprises.exists(fields.enterprise_id).await? {
            return Err(AppError::BadRequest(format!(
                "Enterprise {} does not exist",
                fields.enterprise_id
            )));
        }

        Ok(fields)
    }
}

pub struct EnterpriseService {
    enterprises: EnterpriseStore,
}

impl EnterpriseService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            enterprises: EnterpriseStore::new(pool),
        }
    }

    pub async fn list(&self) -> Result<Vec<Enterprise>, AppError> {
        self.enterprises.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Enterprise, AppError> {
        self.enterprises.get(id).await
    }

    pub async fn create(&self, input: &EnterpriseInput) -> Result<Enterprise, AppError> {
        let name = require_text("name", &input.name)?;
        let enterprise = self
            .enterprises
            .insert(&name, input.responsible.trim(), input.notes.trim())
            .await?;
        tracing::info!("Created enterprise {} ({})", enterprise.id, enterprise.name);
        Ok(enterprise)
    }
}

pub struct UserProfileService {
    users: UserProfileStore,
}

impl UserProfileService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserProfileStore::new(pool),
        }
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>, AppError> {
        self.users.list().await
    }

    /// Registers the profile of a user that already exists at the identity provider.
    pub async fn create(&self, input: &UserProfileInput) -> Result<UserProfile, AppError> {
        let uid = require_text("uid", &input.uid)?;
        let name = require_text("name", &input.name)?;
        let email = input.email.trim();
        if !is_valid_email(email) {
            return Err(AppError::BadRequest(format!("Invalid email: {}", email)));
        }

        self.users.insert(&uid, &name, email, input.level).await
    }

    pub async fn toggle_active(&self, uid: &str) -> Result<UserProfile, AppError> {
        let user = self.users.toggle_active(uid).await?;
        tracing::info!("User {} active = {}", user.uid, user.active);
        Ok(user)
    }

    pub async fn set_level(&self, uid: &str, level: UserLevel) -> Result<UserProfile, AppError> {
        let user = self.users.set_level(uid, level).await?;
        tracing::info!("User {} level = {}", user.uid, user.level.as_str());
        Ok(user)
    }
}

/// Dashboard summaries keyed by day and write generation.
///
/// Every write bumps the generation before clearing the cache, so a summary
/// computed from rows read before the write is stored under a key no later
/// lookup asks for.
#[derive(Clone)]
pub struct DashboardCache {
    entries: Cache<(NaiveDate, u64), DashboardSummary>,
    generation: Arc<AtomicU64>,
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).max_capacity(8).build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.invalidate_all();
    }

    pub async fn get_or_load<F>(&self, today: NaiveDate, load: F) -> Result<DashboardSummary, AppError>
    where
        F: Future<Output = Result<DashboardSummary, AppError>>,
    {
        self.entries
            .try_get_with((today, self.generation()), load)
            .await
            .map_err(|e| (*e).clone())
    }

    #[cfg(test)]
    async fn insert_at(&self, today: NaiveDate, generation: u64, summary: DashboardSummary) {
        self.entries.insert((today, generation), summary).await;
    }
}

pub struct DashboardService {
    points: CapturePointStore,
    cache: DashboardCache,
    expiring_window_days: i64,
}

impl DashboardService {
    pub fn new(config: &Config, pool: PgPool, cache: DashboardCache) -> Self {
        Self {
            points: CapturePointStore::new(pool),
            cache,
            expiring_window_days: config.expiring_window_days,
        }
    }

    /// Summary for `today`, computed at most once per cache TTL and write.
    pub async fn summary(&self, today: NaiveDate) -> Result<DashboardSummary, AppError> {
        self.cache
            .get_or_load(today, async {
                tracing::debug!("Dashboard cache miss for {}", today);
                let points = self.points.list().await?;
                Ok::<_, AppError>(summarize_dashboard(
                    &points,
                    today,
                    self.expiring_window_days,
                ))
            })
            .await
    }
}

pub struct ReportService {
    points: CapturePointStore,
    snapshots: ReportSnapshotStore,
}

impl ReportService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            points: CapturePointStore::new(pool.clone()),
            snapshots: ReportSnapshotStore::new(pool),
        }
    }

    async fn filtered(&self, filter: &ReportFilter) -> Result<Vec<CapturePoint>, AppError> {
        let points = self.points.list().await?;
        Ok(filter_points(&points, filter))
    }

    pub async fn generate(&self, filter: ReportFilter) -> Result<ReportResponse, AppError> {
        let points = self.filtered(&filter).await?;
        let totals = compute_totals(&points);
        let table = report_table(&points, &totals);
        let formatted_totals =
            FormattedTotals::new(&totals.billed, &totals.passed_through, &totals.profit);

        tracing::info!(
            "Report generated: {} point(s), billed {}",
            totals.point_count,
            formatted_totals.billed
        );

        Ok(ReportResponse {
            filter,
            totals,
            formatted_totals,
            points: points.into_iter().map(CapturePointView::from).collect(),
            table,
        })
    }

    pub async fn export_csv(&self, filter: &ReportFilter) -> Result<String, AppError> {
        let points = self.filtered(filter).await?;
        let csv = render_csv(&export_rows(&points))?;
        tracing::info!("CSV export: {} row(s)", points.len());
        Ok(csv)
    }

    pub async fn save_snapshot(&self, request: &SnapshotRequest) -> Result<ReportSnapshot, AppError> {
        let generated_by = require_text("generated_by", &request.generated_by)?;
        let filter = request.filter();
        let points = self.filtered(&filter).await?;
        let totals = compute_totals(&points);

        self.snapshots.insert(&filter, &totals, &generated_by).await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<ReportSnapshot>, AppError> {
        self.snapshots.list().await
    }
}
