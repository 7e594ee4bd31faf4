//! Report and dashboard computations over already-loaded capture points.
//!
//! Filtering is plain equality/range matching done in memory.
use crate::formatting::{format_amount, format_currency, format_date};
use crate::models::{CapturePoint, PointStatus};
use bigdecimal::{BigDecimal, Zero};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contracts ending within this many days count as expiring.
pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;

/// Number of points shown in the dashboard chart.
pub const CHART_POINTS: usize = 5;

/// Chart labels are cut to this many characters.
pub const CHART_LABEL_CHARS: usize = 10;

/// Report criteria. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Earliest contract start date (inclusive).
    pub period_start: Option<NaiveDate>,
    /// Latest contract start date (inclusive).
    pub period_end: Option<NaiveDate>,
    pub enterprise_id: Option<Uuid>,
    pub status: Option<PointStatus>,
}

impl ReportFilter {
    pub fn matches(&self, point: &CapturePoint) -> bool {
        let enterprise_ok = self
            .enterprise_id
            .map_or(true, |id| point.enterprise_id == id);
        let status_ok = self.status.map_or(true, |status| point.status == status);
        let after_start = self
            .period_start
            .map_or(true, |start| point.start_date >= start);
        let before_end = self
            .period_end
            .map_or(true, |end| point.start_date <= end);

        enterprise_ok && status_ok && after_start && before_end
    }
}

/// Points matching `filter`, in their original order.
pub fn filter_points(points: &[CapturePoint], filter: &ReportFilter) -> Vec<CapturePoint> {
    points
        .iter()
        .filter(|point| filter.matches(point))
        .cloned()
        .collect()
}

/// Free-text search: name (case-insensitive) or CNPJ substring.
pub fn search_points(points: &[CapturePoint], term: &str) -> Vec<CapturePoint> {
    let term = term.trim();
    if term.is_empty() {
        return points.to_vec();
    }

    let lowered = term.to_lowercase();
    points
        .iter()
        .filter(|point| point.name.to_lowercase().contains(&lowered) || point.tax_id.contains(term))
        .cloned()
        .collect()
}

/// Sums over a set of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub point_count: usize,
    /// Sum of closed values.
    pub billed: BigDecimal,
    /// Sum of pass-through values.
    pub passed_through: BigDecimal,
    /// Sum of profit margins.
    pub profit: BigDecimal,
}

impl Default for ReportTotals {
    fn default() -> Self {
        Self {
            point_count: 0,
            billed: BigDecimal::zero(),
            passed_through: BigDecimal::zero(),
            profit: BigDecimal::zero(),
        }
    }
}

pub fn compute_totals(points: &[CapturePoint]) -> ReportTotals {
    points
        .iter()
        .fold(ReportTotals::default(), |mut totals, point| {
            totals.point_count += 1;
            totals.billed += &point.closed_value;
            totals.passed_through += &point.pass_through_value;
            totals.profit += &point.profit_margin;
            totals
        })
}

/// One bar pair in the dashboard chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartEntry {
    pub name: String,
    pub billed: BigDecimal,
    pub profit: BigDecimal,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// Sum of closed values of active points.
    pub total_billed: BigDecimal,
    /// Sum of pass-through values of active points.
    pub total_passed_through: BigDecimal,
    /// Billed minus passed through.
    pub total_profit: BigDecimal,
    pub active_points: usize,
    /// Active contracts ending strictly between today and today + window.
    pub expiring_soon: usize,
    pub expiring_window_days: i64,
    /// First points of the list (newest first), any status.
    pub chart: Vec<ChartEntry>,
}

/// Aggregates the dashboard from every point, newest first.
pub fn summarize_dashboard(
    points: &[CapturePoint],
    today: NaiveDate,
    expiring_window_days: i64,
) -> DashboardSummary {
    let horizon = today
        .checked_add_signed(Duration::days(expiring_window_days))
        .unwrap_or(NaiveDate::MAX);

    let active: Vec<&CapturePoint> = points
        .iter()
        .filter(|point| point.status == PointStatus::Active)
        .collect();

    let mut total_billed = BigDecimal::zero();
    let mut total_passed_through = BigDecimal::zero();
    for point in &active {
        total_billed += &point.closed_value;
        total_passed_through += &point.pass_through_value;
    }

    let expiring_soon = active
        .iter()
        .filter(|point| point.end_date > today && point.end_date < horizon)
        .count();

    let chart = points
        .iter()
        .take(CHART_POINTS)
        .map(|point| ChartEntry {
            name: point.name.chars().take(CHART_LABEL_CHARS).collect(),
            billed: point.closed_value.clone(),
            profit: point.profit_margin.clone(),
        })
        .collect();

    DashboardSummary {
        total_profit: &total_billed - &total_passed_through,
        total_billed,
        total_passed_through,
        active_points: active.len(),
        expiring_soon,
        expiring_window_days,
        chart,
    }
}

/// Spreadsheet export row. Column names are the ones users know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Ponto")]
    pub name: String,
    #[serde(rename = "CNPJ")]
    pub tax_id: String,
    #[serde(rename = "Responsável")]
    pub responsible: String,
    #[serde(rename = "Início")]
    pub start_date: String,
    #[serde(rename = "Término")]
    pub end_date: String,
    #[serde(rename = "Valor Fechado")]
    pub closed_value: String,
    #[serde(rename = "Valor Repassado")]
    pub pass_through_value: String,
    #[serde(rename = "Margem Lucro")]
    pub profit_margin: String,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Money stays numeric (plain decimal) so spreadsheets can sum it.
pub fn export_rows(points: &[CapturePoint]) -> Vec<ExportRow> {
    points
        .iter()
        .map(|point| ExportRow {
            name: point.name.clone(),
            tax_id: point.tax_id.clone(),
            responsible: point.responsible.clone(),
            start_date: format_date(point.start_date),
            end_date: format_date(point.end_date),
            closed_value: format_amount(&point.closed_value),
            pass_through_value: format_amount(&point.pass_through_value),
            profit_margin: format_amount(&point.profit_margin),
            status: point.status.label().to_string(),
        })
        .collect()
}

pub fn render_csv(rows: &[ExportRow]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    if rows.is_empty() {
        // serialize() writes headers lazily, so an empty report needs them explicitly
        wtr.write_record(EXPORT_HEADERS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

const EXPORT_HEADERS: [&str; 9] = [
    "Ponto",
    "CNPJ",
    "Responsável",
    "Início",
    "Término",
    "Valor Fechado",
    "Valor Repassado",
    "Margem Lucro",
    "Status",
];

/// Printable report: header, one formatted row per point, totals footer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub head: Vec<String>,
    pub body: Vec<Vec<String>>,
    pub foot: Vec<String>,
}

pub fn report_table(points: &[CapturePoint], totals: &ReportTotals) -> ReportTable {
    let head = ["Ponto", "CNPJ", "Início", "Faturado", "Repassado", "Lucro", "Status"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    let body = points
        .iter()
        .map(|point| {
            vec![
                point.name.clone(),
                point.tax_id.clone(),
                format_date(point.start_date),
                format_currency(&point.closed_value),
                format_currency(&point.pass_through_value),
                format_currency(&point.profit_margin),
                point.status.label().to_string(),
            ]
        })
        .collect();

    let foot = vec![
        "Totais".to_string(),
        String::new(),
        String::new(),
        format_currency(&totals.billed),
        format_currency(&totals.passed_through),
        format_currency(&totals.profit),
        String::new(),
    ];

    ReportTable { head, body, foot }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{derive_fields, ContractTerms};
    use chrono::Utc;
    use std::str::FromStr;

    fn point(name: &str, closed: &str, pct: &str, start: NaiveDate, months: i32) -> CapturePoint {
        let terms = ContractTerms {
            closed_value: BigDecimal::from_str(closed).unwrap(),
            pass_through_percentage: BigDecimal::from_str(pct).unwrap(),
            start_date: start,
            contract_duration_months: months,
        };
        let derived = derive_fields(&terms);
        CapturePoint {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tax_id: "12.345.678/0001-95".to_string(),
            address: "Rua A, 1".to_string(),
            enterprise_id: Uuid::nil(),
            responsible: "Ana".to_string(),
            real_value: BigDecimal::zero(),
            closed_value: terms.closed_value,
            pass_through_percentage: terms.pass_through_percentage,
            pass_through_value: derived.pass_through_value,
            profit_margin: derived.profit_margin,
            start_date: terms.start_date,
            contract_duration_months: terms.contract_duration_months,
            end_date: derived.end_date,
            status: PointStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_csv_has_headers_even_when_empty() {
        let csv = render_csv(&[]).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Ponto,CNPJ,Responsável,Início,Término,Valor Fechado,Valor Repassado,Margem Lucro,Status"
        );
    }

    #[test]
    fn test_csv_rows() {
        let points = vec![point("Loja Centro", "1000", "10", date(2025, 3, 5), 12)];
        let csv = render_csv(&export_rows(&points)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "Loja Centro,12.345.678/0001-95,Ana,05/03/2025,05/03/2026,1000.00,100.00,900.00,Ativo"
        );
    }

    #[test]
    fn test_report_table_footer_formats_totals() {
        let points = vec![
            point("A", "1000", "10", date(2025, 1, 1), 12),
            point("B", "234.5", "0", date(2025, 1, 1), 12),
        ];
        let table = report_table(&points, &compute_totals(&points));

        assert_eq!(table.head.len(), 7);
        assert_eq!(table.body.len(), 2);
        assert_eq!(table.body[0][3], "R$ 1.000,00");
        assert_eq!(table.foot[0], "Totais");
        assert_eq!(table.foot[3], "R$ 1.234,50");
        assert_eq!(table.foot[4], "R$ 100,00");
        assert_eq!(table.foot[5], "R$ 1.134,50");
    }
}
