/// Derivation engine behavior as seen from the form: every input edit
/// recomputes the derived fields, nothing else changes them.
use bigdecimal::BigDecimal;
use capture_points_api::derivation::{
    compute_end_date, compute_pass_through_value, compute_profit_margin, derive_fields,
    CapturePointDraft, ContractTerms, TermsEdit,
};
use capture_points_api::formatting::{format_currency, format_date, format_tax_id, parse_decimal};
use chrono::NaiveDate;
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_pass_through_and_margin() {
    let pass_through = compute_pass_through_value(&dec("1000"), &dec("10"));
    assert_eq!(pass_through, dec("100"));
    assert_eq!(compute_profit_margin(&dec("1000"), &pass_through), dec("900"));
}

#[test]
fn test_percentages_outside_range_propagate() {
    assert_eq!(compute_pass_through_value(&dec("200"), &dec("150")), dec("300"));
    assert_eq!(compute_pass_through_value(&dec("200"), &dec("-10")), dec("-20"));
    assert_eq!(compute_profit_margin(&dec("200"), &dec("300")), dec("-100"));
}

#[test]
fn test_end_date_calendar_months() {
    assert_eq!(compute_end_date(date(2025, 3, 5), 12), date(2026, 3, 5));
    assert_eq!(compute_end_date(date(2025, 3, 5), 0), date(2025, 3, 5));
    assert_eq!(compute_end_date(date(2025, 8, 31), 6), date(2026, 2, 28));
    assert_eq!(compute_end_date(date(2025, 3, 5), -2), date(2025, 1, 5));
}

#[test]
fn test_derive_fields_single_step() {
    let terms = ContractTerms {
        closed_value: dec("1234.50"),
        pass_through_percentage: dec("12.5"),
        start_date: date(2024, 1, 31),
        contract_duration_months: 1,
    };
    let derived = derive_fields(&terms);

    assert_eq!(derived.pass_through_value, dec("154.3125"));
    assert_eq!(derived.profit_margin, dec("1080.1875"));
    assert_eq!(derived.end_date, date(2024, 2, 29));
}

#[test]
fn test_draft_edits_recompute_everything() {
    let mut draft = CapturePointDraft::new(date(2025, 3, 5));

    draft.apply(TermsEdit::ClosedValue(dec("1000")));
    assert_eq!(draft.derived().profit_margin, dec("1000"));

    let derived = draft.apply(TermsEdit::PassThroughPercentage(dec("10")));
    assert_eq!(derived.pass_through_value, dec("100"));
    assert_eq!(derived.profit_margin, dec("900"));

    draft.apply(TermsEdit::ContractDurationMonths(6));
    assert_eq!(draft.derived().end_date, date(2025, 9, 5));

    draft.apply(TermsEdit::StartDate(date(2024, 8, 31)));
    assert_eq!(draft.derived().end_date, date(2025, 2, 28));

    // Derived state is always what derive_fields gives for the current terms
    assert_eq!(draft.derived(), &derive_fields(draft.terms()));
}

#[test]
fn test_edit_wire_format() {
    let edit: TermsEdit =
        serde_json::from_value(serde_json::json!({"field": "contract_duration_months", "value": 24}))
            .unwrap();
    assert_eq!(edit, TermsEdit::ContractDurationMonths(24));

    let edit: TermsEdit =
        serde_json::from_value(serde_json::json!({"field": "start_date", "value": "2025-01-31"}))
            .unwrap();
    assert_eq!(edit, TermsEdit::StartDate(date(2025, 1, 31)));
}

#[test]
fn test_display_strings() {
    assert_eq!(format_currency(&dec("1234.5")), "R$ 1.234,50");
    assert_eq!(format_currency(&dec("0")), "R$ 0,00");
    assert_eq!(format_currency(&dec("1234567.891")), "R$ 1.234.567,89");
    assert_eq!(format_currency(&dec("0.005")), "R$ 0,01");
    assert_eq!(format_currency(&dec("-50")), "-R$ 50,00");
    assert_eq!(format_date(date(2025, 3, 5)), "05/03/2025");
    assert_eq!(format_tax_id("12345678000195"), "12.345.678/0001-95");
    assert_eq!(format_tax_id("12.345"), "12.345");
    assert_eq!(format_tax_id("1234"), "12.34");
    assert_eq!(format_tax_id("123456780001"), "12.345.678/0001");
    assert_eq!(format_tax_id("1234567800019"), "12.345.678/0001-9");
    assert_eq!(format_tax_id("123456780001951234"), "12.345.678/0001-95");
}

#[test]
fn test_form_parsing_round_trips_through_display() {
    let typed = parse_decimal("1.234,50").unwrap();
    assert_eq!(typed, dec("1234.50"));
    assert_eq!(format_currency(&typed), "R$ 1.234,50");
    assert!(parse_decimal("abc").is_err());
}
