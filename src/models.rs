use crate::derivation::{
    CapturePointDraft, ContractTerms, DerivedFields, DEFAULT_CONTRACT_MONTHS,
};
use crate::errors::AppError;
use crate::formatting::{format_currency, format_date};
use crate::reports::{DashboardSummary, ReportFilter, ReportTable, ReportTotals};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Database Models ============

/// Contract status of a capture point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    #[default]
    Active,
    Terminated,
}

impl PointStatus {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PointStatus::Active => "active",
            PointStatus::Terminated => "terminated",
        }
    }

    /// Label shown in exports.
    pub fn label(&self) -> &'static str {
        match self {
            PointStatus::Active => "Ativo",
            PointStatus::Terminated => "Encerrado",
        }
    }
}

impl fmt::Display for PointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointStatus {
    type Err = AppError;

    /// Accepts the stored values and the legacy Portuguese ones (`ativo`, `encerrado`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "ativo" => Ok(PointStatus::Active),
            "terminated" | "encerrado" => Ok(PointStatus::Terminated),
            other => Err(AppError::BadRequest(format!(
                "Unknown status '{}' (expected active or terminated)",
                other
            ))),
        }
    }
}

/// Raw `capture_points` row.
#[derive(Debug, Clone, FromRow)]
pub struct CapturePointRow {
    pub id: Uuid,
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub enterprise_id: Uuid,
    pub responsible: String,
    pub real_value: BigDecimal,
    pub closed_value: BigDecimal,
    pub pass_through_percentage: BigDecimal,
    pub pass_through_value: BigDecimal,
    pub profit_margin: BigDecimal,
    pub start_date: NaiveDate,
    pub contract_duration_months: i32,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A contracted location being monetized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturePoint {
    /// Unique identifier.
    pub id: Uuid,
    /// Point name.
    pub name: String,
    /// CNPJ, masked as `DD.DDD.DDD/DDDD-DD`.
    pub tax_id: String,
    pub address: String,
    /// Enterprise the point belongs to (reference only).
    pub enterprise_id: Uuid,
    /// Person in charge at the location.
    pub responsible: String,
    /// Informational list price; no derivation uses it.
    pub real_value: BigDecimal,
    pub closed_value: BigDecimal,
    pub pass_through_percentage: BigDecimal,
    /// Derived from closed value and percentage.
    pub pass_through_value: BigDecimal,
    /// Derived: closed value minus pass-through value.
    pub profit_margin: BigDecimal,
    pub start_date: NaiveDate,
    pub contract_duration_months: i32,
    /// Derived from start date and duration.
    pub end_date: NaiveDate,
    pub status: PointStatus,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CapturePointRow> for CapturePoint {
    type Error = AppError;

    fn try_from(row: CapturePointRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<PointStatus>().map_err(|_| {
            AppError::InternalError(format!(
                "capture point {} has invalid status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            tax_id: row.tax_id,
            address: row.address,
            enterprise_id: row.enterprise_id,
            responsible: row.responsible,
            real_value: row.real_value,
            closed_value: row.closed_value,
            pass_through_percentage: row.pass_through_percentage,
            pass_through_value: row.pass_through_value,
            profit_margin: row.profit_margin,
            start_date: row.start_date,
            contract_duration_months: row.contract_duration_months,
            end_date: row.end_date,
            status,
            created_at: row.created_at,
        })
    }
}

impl CapturePoint {
    /// The independent contract inputs of this point.
    pub fn terms(&self) -> ContractTerms {
        ContractTerms {
            closed_value: self.closed_value.clone(),
            pass_through_percentage: self.pass_through_percentage.clone(),
            start_date: self.start_date,
            contract_duration_months: self.contract_duration_months,
        }
    }

    /// The stored derived fields.
    pub fn derived(&self) -> DerivedFields {
        DerivedFields {
            pass_through_value: self.pass_through_value.clone(),
            profit_margin: self.profit_margin.clone(),
            end_date: self.end_date,
        }
    }
}

/// Validated write set for a capture point: inputs plus freshly derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePointFields {
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub enterprise_id: Uuid,
    pub responsible: String,
    pub real_value: BigDecimal,
    pub terms: ContractTerms,
    pub derived: DerivedFields,
    pub status: PointStatus,
}

/// A partner organization owning capture points.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Enterprise {
    pub id: Uuid,
    pub name: String,
    pub responsible: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Access level of a dashboard user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    Admin,
    #[default]
    Operator,
}

impl UserLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Admin => "admin",
            UserLevel::Operator => "operator",
        }
    }
}

impl FromStr for UserLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(UserLevel::Admin),
            "operator" | "operador" => Ok(UserLevel::Operator),
            other => Err(AppError::BadRequest(format!("Unknown user level '{}'", other))),
        }
    }
}

/// Raw `user_profiles` row.
#[derive(Debug, Clone, FromRow)]
pub struct UserProfileRow {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub level: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Profile of a user authenticated by the external identity provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    /// Identifier issued by the identity provider.
    pub uid: String,
    pub name: String,
    pub email: String,
    pub level: UserLevel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserProfileRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: UserProfileRow) -> Result<Self, Self::Error> {
        let level = row.level.parse::<UserLevel>().map_err(|_| {
            AppError::InternalError(format!("user {} has invalid level '{}'", row.uid, row.level))
        })?;

        Ok(Self {
            uid: row.uid,
            name: row.name,
            email: row.email,
            level,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

/// Persisted totals of a generated report.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ReportSnapshot {
    pub id: Uuid,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub enterprise_id: Option<Uuid>,
    pub status: Option<String>,
    pub point_count: i32,
    pub total_billed: BigDecimal,
    pub total_passed_through: BigDecimal,
    pub total_profit: BigDecimal,
    /// Who asked for the report.
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
}

// ============ API Request/Response Models ============

/// Lenient deserializers for form input: numbers may arrive as JSON numbers
/// or strings, dates as ISO dates or full ISO timestamps.
pub mod form_input {
    use crate::formatting::{parse_decimal, parse_iso_date};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            // Number's Display is the shortest exact rendering of what was sent
            Value::Number(n) => parse_decimal(&n.to_string()).map_err(de::Error::custom),
            Value::String(s) => parse_decimal(&s).map_err(de::Error::custom),
            other => Err(de::Error::custom(format!("expected a number, got {}", other))),
        }
    }

    pub fn date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_iso_date(&raw).map_err(de::Error::custom)
    }
}

fn default_duration() -> i32 {
    DEFAULT_CONTRACT_MONTHS
}

/// Request payload for creating or updating a capture point.
///
/// Derived fields are not accepted; anything a client sends for them is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CapturePointInput {
    pub name: String,
    /// Raw or partially masked CNPJ.
    pub tax_id: String,
    pub address: String,
    pub enterprise_id: Uuid,
    pub responsible: String,
    #[serde(default, deserialize_with = "form_input::decimal")]
    pub real_value: BigDecimal,
    #[serde(deserialize_with = "form_input::decimal")]
    pub closed_value: BigDecimal,
    #[serde(deserialize_with = "form_input::decimal")]
    pub pass_through_percentage: BigDecimal,
    #[serde(deserialize_with = "form_input::date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_duration")]
    pub contract_duration_months: i32,
    #[serde(default)]
    pub status: PointStatus,
}

impl CapturePointInput {
    pub fn terms(&self) -> ContractTerms {
        ContractTerms {
            closed_value: self.closed_value.clone(),
            pass_through_percentage: self.pass_through_percentage.clone(),
            start_date: self.start_date,
            contract_duration_months: self.contract_duration_months,
        }
    }
}

/// Contract inputs sent by the form on every change, for live preview.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    #[serde(default, deserialize_with = "form_input::decimal")]
    pub closed_value: BigDecimal,
    #[serde(default, deserialize_with = "form_input::decimal")]
    pub pass_through_percentage: BigDecimal,
    #[serde(deserialize_with = "form_input::date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_duration")]
    pub contract_duration_months: i32,
    /// Raw CNPJ typed so far; echoed back masked.
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl From<&PreviewRequest> for ContractTerms {
    fn from(request: &PreviewRequest) -> Self {
        ContractTerms {
            closed_value: request.closed_value.clone(),
            pass_through_percentage: request.pass_through_percentage.clone(),
            start_date: request.start_date,
            contract_duration_months: request.contract_duration_months,
        }
    }
}

/// Brazilian display strings for a contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedContract {
    pub closed_value: String,
    pub pass_through_value: String,
    pub profit_margin: String,
    pub start_date: String,
    pub end_date: String,
}

impl FormattedContract {
    pub fn new(terms: &ContractTerms, derived: &DerivedFields) -> Self {
        Self {
            closed_value: format_currency(&terms.closed_value),
            pass_through_value: format_currency(&derived.pass_through_value),
            profit_margin: format_currency(&derived.profit_margin),
            start_date: format_date(terms.start_date),
            end_date: format_date(derived.end_date),
        }
    }
}

/// A capture point together with its display strings.
#[derive(Debug, Clone, Serialize)]
pub struct CapturePointView {
    #[serde(flatten)]
    pub point: CapturePoint,
    pub formatted: FormattedContract,
}

impl From<CapturePoint> for CapturePointView {
    fn from(point: CapturePoint) -> Self {
        let formatted = FormattedContract::new(&point.terms(), &point.derived());
        Self { point, formatted }
    }
}

/// Response payload for the draft and preview endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DraftResponse {
    pub terms: ContractTerms,
    pub derived: DerivedFields,
    pub formatted: FormattedContract,
    /// Masked CNPJ, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl From<CapturePointDraft> for DraftResponse {
    fn from(draft: CapturePointDraft) -> Self {
        let (terms, derived) = draft.into_parts();
        let formatted = FormattedContract::new(&terms, &derived);
        Self {
            terms,
            derived,
            formatted,
            tax_id: None,
        }
    }
}

/// Brazilian display strings for a set of totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedTotals {
    pub billed: String,
    pub passed_through: String,
    pub profit: String,
}

impl FormattedTotals {
    pub fn new(billed: &BigDecimal, passed_through: &BigDecimal, profit: &BigDecimal) -> Self {
        Self {
            billed: format_currency(billed),
            passed_through: format_currency(passed_through),
            profit: format_currency(profit),
        }
    }
}

/// Response payload for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub today: NaiveDate,
    #[serde(flatten)]
    pub summary: DashboardSummary,
    pub formatted: FormattedTotals,
}

impl DashboardResponse {
    pub fn new(today: NaiveDate, summary: DashboardSummary) -> Self {
        let formatted = FormattedTotals::new(
            &summary.total_billed,
            &summary.total_passed_through,
            &summary.total_profit,
        );
        Self {
            today,
            summary,
            formatted,
        }
    }
}

/// Response payload for a filtered report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub filter: ReportFilter,
    pub totals: ReportTotals,
    pub formatted_totals: FormattedTotals,
    pub points: Vec<CapturePointView>,
    /// Printable rendition (header, rows, totals footer).
    pub table: ReportTable,
}

/// Query parameters for the capture point list.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Matches the point name (case-insensitive) or the CNPJ.
    pub search: Option<String>,
}

/// Request payload for creating an enterprise.
#[derive(Debug, Clone, Deserialize)]
pub struct EnterpriseInput {
    pub name: String,
    #[serde(default)]
    pub responsible: String,
    #[serde(default)]
    pub notes: String,
}

/// Request payload for registering a user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfileInput {
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub level: UserLevel,
}

/// Request payload for changing a user's level.
#[derive(Debug, Clone, Deserialize)]
pub struct SetLevelRequest {
    pub level: UserLevel,
}

/// Report filter as it arrives in a query string, where empty means "any".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub enterprise_id: Option<String>,
    pub status: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ReportQuery {
    /// Parses the query into a typed filter.
    pub fn into_filter(self) -> Result<ReportFilter, AppError> {
        let parse_date = |field: &str, value: &Option<String>| {
            non_empty(value)
                .map(|raw| {
                    crate::formatting::parse_iso_date(raw).map_err(|e| {
                        AppError::BadRequest(format!("{} must be an ISO date: {}", field, e))
                    })
                })
                .transpose()
        };

        let enterprise_id = non_empty(&self.enterprise_id)
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|e| {
                    AppError::BadRequest(format!("enterprise_id must be a UUID: {}", e))
                })
            })
            .transpose()?;

        let status = non_empty(&self.status)
            .map(str::parse::<PointStatus>)
            .transpose()?;

        Ok(ReportFilter {
            period_start: parse_date("period_start", &self.period_start)?,
            period_end: parse_date("period_end", &self.period_end)?,
            enterprise_id,
            status,
        })
    }
}

/// Request payload for persisting a report's totals.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRequest {
    pub generated_by: String,
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub enterprise_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<PointStatus>,
}

impl SnapshotRequest {
    pub fn filter(&self) -> ReportFilter {
        ReportFilter {
            period_start: self.period_start,
            period_end: self.period_end,
            enterprise_id: self.enterprise_id,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_accepts_legacy_values() {
        assert_eq!("ativo".parse::<PointStatus>().unwrap(), PointStatus::Active);
        assert_eq!("Encerrado".parse::<PointStatus>().unwrap(), PointStatus::Terminated);
        assert!("paused".parse::<PointStatus>().is_err());
    }

    #[test]
    fn test_input_accepts_numbers_and_strings() {
        let input: CapturePointInput = serde_json::from_value(json!({
            "name": "Loja Centro",
            "tax_id": "12345678000195",
            "address": "Rua A, 1",
            "enterprise_id": "6f1c3c1e-0000-4000-8000-000000000001",
            "responsible": "Ana",
            "closed_value": 1234.5,
            "pass_through_percentage": "10",
            "start_date": "2025-03-05",
            "pass_through_value": 999
        }))
        .unwrap();

        assert_eq!(input.closed_value, BigDecimal::from_str("1234.5").unwrap());
        assert_eq!(input.pass_through_percentage, BigDecimal::from(10));
        assert_eq!(input.contract_duration_months, 12);
        assert_eq!(input.status, PointStatus::Active);
    }

    #[test]
    fn test_decimal_from_json_number_is_exact() {
        let request: PreviewRequest =
            serde_json::from_value(json!({"closed_value": 0.1, "start_date": "2025-01-01"})).unwrap();
        assert_eq!(request.closed_value, BigDecimal::from_str("0.1").unwrap());
    }

    #[test]
    fn test_decimal_out_of_range_fails_to_deserialize() {
        for raw in [json!("1e-9223372036854775806"), json!("1e400000"), json!(1e300)] {
            let request = serde_json::from_value::<PreviewRequest>(json!({
                "pass_through_percentage": raw.clone(),
                "start_date": "2025-01-01"
            }));
            assert!(request.is_err(), "{} was accepted", raw);
        }

        let input = serde_json::from_value::<CapturePointInput>(json!({
            "name": "Loja Centro",
            "tax_id": "12345678000195",
            "address": "Rua A, 1",
            "enterprise_id": "6f1c3c1e-0000-4000-8000-000000000001",
            "responsible": "Ana",
            "closed_value": "1e400000",
            "pass_through_percentage": "10",
            "start_date": "2025-03-05"
        }));
        assert!(input.is_err());
    }

    #[test]
    fn test_report_query_treats_empty_as_any() {
        let filter = ReportQuery {
            period_start: Some("".into()),
            period_end: Some("2025-12-31".into()),
            enterprise_id: None,
            status: Some(" ".into()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.period_start, None);
        assert_eq!(filter.period_end, NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(filter.status, None);
    }

    #[test]
    fn test_report_query_rejects_bad_values() {
        let bad_date = ReportQuery {
            period_start: Some("31/12/2025".into()),
            ..Default::default()
        };
        assert!(matches!(bad_date.into_filter(), Err(AppError::BadRequest(_))));

        let bad_status = ReportQuery {
            status: Some("paused".into()),
            ..Default::default()
        };
        assert!(matches!(bad_status.into_filter(), Err(AppError::BadRequest(_))));
    }
}
