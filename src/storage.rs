use crate::derivation::DerivedFields;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CapturePoint, CapturePointFields, CapturePointRow, Enterprise, ReportSnapshot, UserLevel,
    UserProfile, UserProfileRow,
};
use crate::reports::{ReportFilter, ReportTotals};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Database storage for capture points
pub struct CapturePointStore {
    pool: PgPool,
}

impl CapturePointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All points, newest first
    pub async fn list(&self) -> Result<Vec<CapturePoint>, AppError> {
        let rows = sqlx::query_as::<_, CapturePointRow>(
            "SELECT * FROM capture_points ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list capture points")?;

        rows.into_iter().map(CapturePoint::try_from).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<CapturePoint, AppError> {
        let row = sqlx::query_as::<_, CapturePointRow>("SELECT * FROM capture_points WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load capture point {}", id))?
            .ok_or_else(|| AppError::NotFound(format!("Capture point with id {} not found", id)))?;

        CapturePoint::try_from(row)
    }

    pub async fn insert(&self, fields: &CapturePointFields) -> Result<CapturePoint, AppError> {
        self.insert_at(fields, Utc::now()).await
    }

    /// Insert keeping a known creation time (imports).
    pub async fn insert_at(
        &self,
        fields: &CapturePointFields,
        created_at: DateTime<Utc>,
    ) -> Result<CapturePoint, AppError> {
        let row = sqlx::query_as::<_, CapturePointRow>(
            r#"
            INSERT INTO capture_points (
                id, name, tax_id, address, enterprise_id, responsible, real_value,
                closed_value, pass_through_percentage, pass_through_value, profit_margin,
                start_date, contract_duration_months, end_date, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&fields.name)
        .bind(&fields.tax_id)
        .bind(&fields.address)
        .bind(fields.enterprise_id)
        .bind(&fields.responsible)
        .bind(&fields.real_value)
        .bind(&fields.terms.closed_value)
        .bind(&fields.terms.pass_through_percentage)
        .bind(&fields.derived.pass_through_value)
        .bind(&fields.derived.profit_margin)
        .bind(fields.terms.start_date)
        .bind(fields.terms.contract_duration_months)
        .bind(fields.derived.end_date)
        .bind(fields.status.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert capture point")?;

        CapturePoint::try_from(row)
    }

    /// Replaces every editable field; `created_at` is kept.
    pub async fn update(
        &self,
        id: Uuid,
        fields: &CapturePointFields,
    ) -> Result<CapturePoint, AppError> {
        let row = sqlx::query_as::<_, CapturePointRow>(
            r#"
            UPDATE capture_points SET
                name = $2,
                tax_id = $3,
                address = $4,
                enterprise_id = $5,
                responsible = $6,
                real_value = $7,
                closed_value = $8,
                pass_through_percentage = $9,
                pass_through_value = $10,
                profit_margin = $11,
                start_date = $12,
                contract_duration_months = $13,
                end_date = $14,
                status = $15
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.tax_id)
        .bind(&fields.address)
        .bind(fields.enterprise_id)
        .bind(&fields.responsible)
        .bind(&fields.real_value)
        .bind(&fields.terms.closed_value)
        .bind(&fields.terms.pass_through_percentage)
        .bind(&fields.derived.pass_through_value)
        .bind(&fields.derived.profit_margin)
        .bind(fields.terms.start_date)
        .bind(fields.terms.contract_duration_months)
        .bind(fields.derived.end_date)
        .bind(fields.status.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to update capture point {}", id))?
        .ok_or_else(|| AppError::NotFound(format!("Capture point with id {} not found", id)))?;

        CapturePoint::try_from(row)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM capture_points WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete capture point {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Capture point with id {} not found",
                id
            )));
        }
        Ok(())
    }

    /// Overwrites only the derived columns of one point.
    pub async fn rewrite_derived(&self, id: Uuid, derived: &DerivedFields) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE capture_points
            SET pass_through_value = $2, profit_margin = $3, end_date = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&derived.pass_through_value)
        .bind(&derived.profit_margin)
        .bind(derived.end_date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to rewrite derived fields of {}", id))?;

        Ok(())
    }
}

/// Database storage for enterprises
pub struct EnterpriseStore {
    pool: PgPool,
}

impl EnterpriseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Enterprise>, AppError> {
        sqlx::query_as::<_, Enterprise>("SELECT * FROM enterprises ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list enterprises")
    }

    pub async fn get(&self, id: Uuid) -> Result<Enterprise, AppError> {
        sqlx::query_as::<_, Enterprise>("SELECT * FROM enterprises WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load enterprise {}", id))?
            .ok_or_else(|| AppError::NotFound(format!("Enterprise with id {} not found", id)))
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM enterprises WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check enterprise")?;
        Ok(exists)
    }

    pub async fn insert(
        &self,
        name: &str,
        responsible: &str,
        notes: &str,
    ) -> Result<Enterprise, AppError> {
        sqlx::query_as::<_, Enterprise>(
            r#"
            INSERT INTO enterprises (id, name, responsible, notes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(responsible)
        .bind(notes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert enterprise")
    }
}

/// Database storage for user profiles
pub struct UserProfileStore {
    pool: PgPool,
}

impl UserProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>, AppError> {
        let rows = sqlx::query_as::<_, UserProfileRow>(
            "SELECT * FROM user_profiles ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user profiles")?;

        rows.into_iter().map(UserProfile::try_from).collect()
    }

    pub async fn insert(
        &self,
        uid: &str,
        name: &str,
        email: &str,
        level: UserLevel,
    ) -> Result<UserProfile, AppError> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            r#"
            INSERT INTO user_profiles (uid, name, email, level, active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING *
            "#,
        )
        .bind(uid)
        .bind(name)
        .bind(email)
        .bind(level.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to insert user profile {}", uid))?;

        UserProfile::try_from(row)
    }

    /// Flips the active flag.
    pub async fn toggle_active(&self, uid: &str) -> Result<UserProfile, AppError> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            "UPDATE user_profiles SET active = NOT active WHERE uid = $1 RETURNING *",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to toggle user {}", uid))?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

        UserProfile::try_from(row)
    }

    pub async fn set_level(&self, uid: &str, level: UserLevel) -> Result<UserProfile, AppError> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            "UPDATE user_profiles SET level = $2 WHERE uid = $1 RETURNING *",
        )
        .bind(uid)
        .bind(level.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to change level of user {}", uid))?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

        UserProfile::try_from(row)
    }
}

/// Database storage for report snapshots
pub struct ReportSnapshotStore {
    pool: PgPool,
}

impl ReportSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        filter: &ReportFilter,
        totals: &ReportTotals,
        generated_by: &str,
    ) -> Result<ReportSnapshot, AppError> {
        let point_count = i32::try_from(totals.point_count)
            .map_err(|_| AppError::InternalError("Report has too many points".to_string()))?;

        sqlx::query_as::<_, ReportSnapshot>(
            r#"
            INSERT INTO report_snapshots (
                id, period_start, period_end, enterprise_id, status, point_count,
                total_billed, total_passed_through, total_profit, generated_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(filter.period_start)
        .bind(filter.period_end)
        .bind(filter.enterprise_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(point_count)
        .bind(&totals.billed)
        .bind(&totals.passed_through)
        .bind(&totals.profit)
        .bind(generated_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert report snapshot")
    }

    pub async fn list(&self) -> Result<Vec<ReportSnapshot>, AppError> {
        sqlx::query_as::<_, ReportSnapshot>(
            "SELECT * FROM report_snapshots ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list report snapshots")
    }
}
