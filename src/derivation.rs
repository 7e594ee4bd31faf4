//! Contract derivation engine.
//!
//! A capture point has four independent contract inputs (closed value,
//! pass-through percentage, start date, duration in months). Everything else
//! about the contract is derived from them here:
//!
//! 1. Pass-through value = closed value × percentage / 100
//! 2. Profit margin = closed value − pass-through value
//! 3. End date = start date + duration (calendar months, clamped to month end)
//!
//! All functions are pure and total. Callers parse raw input first
//! (see `formatting::parse_decimal` / `formatting::parse_iso_date`).
use bigdecimal::{BigDecimal, Zero};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Contract duration applied to a fresh draft.
pub const DEFAULT_CONTRACT_MONTHS: i32 = 12;

/// Adds `duration_months` calendar months to `start_date`.
///
/// Lands on the same day-of-month, clamped to the last day of the target
/// month (Jan 31 + 1 month is Feb 28, or Feb 29 in leap years). Zero returns
/// the start date and negative durations move backward with the same
/// clamping. Results outside chrono's calendar saturate to
/// `NaiveDate::MIN` / `NaiveDate::MAX`.
pub fn compute_end_date(start_date: NaiveDate, duration_months: i32) -> NaiveDate {
    let months = Months::new(duration_months.unsigned_abs());

    if duration_months >= 0 {
        start_date
            .checked_add_months(months)
            .unwrap_or(NaiveDate::MAX)
    } else {
        start_date
            .checked_sub_months(months)
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Portion of the closed value passed on to a third party.
///
/// No clamping: percentages above 100, below 0 or negative closed values
/// propagate linearly. Input parsed by `formatting::parse_decimal` is
/// bounded; a product whose scale cannot be shifted further yields zero.
pub fn compute_pass_through_value(
    closed_value: &BigDecimal,
    percentage: &BigDecimal,
) -> BigDecimal {
    // Dividing by 100 only moves the decimal point two places
    let (digits, scale) = (closed_value * percentage).into_bigint_and_exponent();
    match scale.checked_add(2) {
        Some(shifted) => BigDecimal::new(digits, shifted),
        // Smaller than 1e-9223372036854775807
        None => BigDecimal::zero(),
    }
}

/// Closed value minus pass-through value. Negative means a loss.
pub fn compute_profit_margin(closed_value: &BigDecimal, pass_through_value: &BigDecimal) -> BigDecimal {
    closed_value - pass_through_value
}

/// The independent, user-entered contract inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub closed_value: BigDecimal,
    pub pass_through_percentage: BigDecimal,
    pub start_date: NaiveDate,
    pub contract_duration_months: i32,
}

impl ContractTerms {
    /// Terms of a brand new contract: zero values, 12 months from `today`.
    pub fn starting_on(today: NaiveDate) -> Self {
        Self {
            closed_value: BigDecimal::zero(),
            pass_through_percentage: BigDecimal::zero(),
            start_date: today,
            contract_duration_months: DEFAULT_CONTRACT_MONTHS,
        }
    }
}

/// Values computed from `ContractTerms`. Never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub pass_through_value: BigDecimal,
    pub profit_margin: BigDecimal,
    pub end_date: NaiveDate,
}

/// Single derivation step: inputs in, every derived field out.
pub fn derive_fields(terms: &ContractTerms) -> DerivedFields {
    let pass_through_value =
        compute_pass_through_value(&terms.closed_value, &terms.pass_through_percentage);
    let profit_margin = compute_profit_margin(&terms.closed_value, &pass_through_value);
    let end_date = compute_end_date(terms.start_date, terms.contract_duration_months);

    DerivedFields {
        pass_through_value,
        profit_margin,
        end_date,
    }
}

/// One mutation of one contract input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum TermsEdit {
    ClosedValue(BigDecimal),
    PassThroughPercentage(BigDecimal),
    StartDate(NaiveDate),
    ContractDurationMonths(i32),
}

/// Capture point contract being edited.
///
/// Inputs and derived outputs are owned separately; the only way to change
/// the derived side is through `apply`, which recomputes it synchronously.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturePointDraft {
    terms: ContractTerms,
    derived: DerivedFields,
}

impl CapturePointDraft {
    /// Draft with the creation defaults (today, 12 months, zero values).
    pub fn new(today: NaiveDate) -> Self {
        Self::from_terms(ContractTerms::starting_on(today))
    }

    pub fn from_terms(terms: ContractTerms) -> Self {
        let derived = derive_fields(&terms);
        Self { terms, derived }
    }

    /// Applies one input edit and recomputes every derived field.
    pub fn apply(&mut self, edit: TermsEdit) -> &DerivedFields {
        match edit {
            TermsEdit::ClosedValue(value) => self.terms.closed_value = value,
            TermsEdit::PassThroughPercentage(value) => self.terms.pass_through_percentage = value,
            TermsEdit::StartDate(date) => self.terms.start_date = date,
            TermsEdit::ContractDurationMonths(months) => {
                self.terms.contract_duration_months = months
            }
        }
        self.derived = derive_fields(&self.terms);
        &self.derived
    }

    pub fn terms(&self) -> &ContractTerms {
        &self.terms
    }

    pub fn derived(&self) -> &DerivedFields {
        &self.derived
    }

    pub fn into_parts(self) -> (ContractTerms, DerivedFields) {
        (self.terms, self.derived)
    }
}
