//! Display formatting for Brazilian users, plus the caller-side parsers
//! that turn raw form input into engine values.
use bigdecimal::{BigDecimal, ParseBigDecimalError, RoundingMode, Signed};
use chrono::NaiveDate;
use std::str::FromStr;

/// Number of digits in a CNPJ.
pub const TAX_ID_DIGITS: usize = 14;

/// Formats an amount as Brazilian Real.
///
/// Two fixed decimals, rounded half away from zero, `.` grouping and `,`
/// as decimal separator:
///
/// - `1234.5` → `"R$ 1.234,50"`
/// - `0` → `"R$ 0,00"`
/// - `-50` → `"-R$ 50,00"`
pub fn format_currency(value: &BigDecimal) -> String {
    let rounded = value.with_scale_round(2, RoundingMode::HalfUp);
    let (cents, _) = rounded.abs().as_bigint_and_exponent();

    // At least "0" + two decimal digits
    let digits = format!("{:0>3}", cents.to_string());
    let (units, decimals) = digits.split_at(digits.len() - 2);

    let sign = if value.is_negative() { "-" } else { "" };
    format!("{}R$ {},{}", sign, group_thousands(units), decimals)
}

/// Plain amount with two decimals (`1234.50`), for machine-readable exports.
pub fn format_amount(value: &BigDecimal) -> String {
    value.with_scale_round(2, RoundingMode::HalfUp).to_string()
}

fn group_thousands(units: &str) -> String {
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (idx, digit) in units.chars().enumerate() {
        if idx > 0 && (units.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    grouped
}

/// Formats a date as `dd/mm/yyyy`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Masks a CNPJ progressively as `DD.DDD.DDD/DDDD-DD`.
///
/// Non-digits are dropped and anything after the 14th digit is discarded.
/// A separator is only written once the digit following it exists, so
/// partial input stays editable: `"1234"` → `"12.34"`.
pub fn format_tax_id(raw: &str) -> String {
    let mut masked = String::with_capacity(TAX_ID_DIGITS + 4);

    for (idx, digit) in tax_id_digits(raw).chars().enumerate() {
        match idx {
            2 | 5 => masked.push('.'),
            8 => masked.push('/'),
            12 => masked.push('-'),
            _ => {}
        }
        masked.push(digit);
    }

    masked
}

/// ASCII digits of a tax id, truncated to 14.
pub fn tax_id_digits(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit())
        .take(TAX_ID_DIGITS)
        .collect()
}

/// Most decimal places accepted from input.
pub const MAX_DECIMAL_PLACES: i64 = 20;

/// Most integer digits accepted from input.
pub const MAX_INTEGER_DIGITS: i64 = 20;

// Longer text cannot hold a value within the two limits above
const MAX_DECIMAL_INPUT_LEN: usize = 64;

/// Parses a decimal typed by a user.
///
/// Accepts `1234.5` as well as the Brazilian `1.234,50`: when a comma is
/// present, dots are thousands separators and the comma is the decimal point.
///
/// Values with more than `MAX_DECIMAL_PLACES` significant decimal places or
/// more than `MAX_INTEGER_DIGITS` integer digits are rejected, so exponent
/// notation such as `1e400000` never reaches the engine or the database.
pub fn parse_decimal(raw: &str) -> Result<BigDecimal, ParseBigDecimalError> {
    let trimmed = raw.trim();
    if trimmed.len() > MAX_DECIMAL_INPUT_LEN {
        return Err(ParseBigDecimalError::Other(format!(
            "number is longer than {} characters",
            MAX_DECIMAL_INPUT_LEN
        )));
    }

    let value = if trimmed.contains(',') {
        let normalized = trimmed.replace('.', "").replace(',', ".");
        BigDecimal::from_str(&normalized)?
    } else {
        BigDecimal::from_str(trimmed)?
    };

    check_decimal_range(&value)?;
    Ok(value)
}

fn check_decimal_range(value: &BigDecimal) -> Result<(), ParseBigDecimalError> {
    let normalized = value.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    let integer_digits = i128::from(normalized.digits()) - i128::from(scale);

    if scale > MAX_DECIMAL_PLACES {
        return Err(ParseBigDecimalError::Other(format!(
            "more than {} decimal places",
            MAX_DECIMAL_PLACES
        )));
    }
    if integer_digits > i128::from(MAX_INTEGER_DIGITS) {
        return Err(ParseBigDecimalError::Other(format!(
            "more than {} integer digits",
            MAX_INTEGER_DIGITS
        )));
    }
    Ok(())
}

/// Parses an ISO date (`2025-03-05`), ignoring any time part.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    let date_part = raw.trim().split('T').next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
}

/// Parses a Brazilian `dd/mm/yyyy` date.
pub fn parse_br_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("0"), "0");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("1000"), "1.000");
        assert_eq!(group_thousands("1234567"), "1.234.567");
    }

    #[test]
    fn test_currency_rounds_half_away_from_zero() {
        assert_eq!(format_currency(&dec("0.005")), "R$ 0,01");
        assert_eq!(format_currency(&dec("2.675")), "R$ 2,68");
        assert_eq!(format_currency(&dec("-2.675")), "-R$ 2,68");
        assert_eq!(format_currency(&dec("0.004")), "R$ 0,00");
    }

    #[test]
    fn test_parse_decimal_accepts_both_conventions() {
        assert_eq!(parse_decimal(" 1234.5 ").unwrap(), dec("1234.5"));
        assert_eq!(parse_decimal("1.234,50").unwrap(), dec("1234.5"));
        assert_eq!(parse_decimal("15,5").unwrap(), dec("15.5"));
        assert!(parse_decimal("abc").is_err());
        assert!(parse_decimal("").is_err());
    }

    #[test]
    fn test_parse_decimal_rejects_out_of_range_values() {
        assert!(parse_decimal("1e-9223372036854775806").is_err());
        assert!(parse_decimal("1e400000").is_err());
        assert!(parse_decimal("1e21").is_err());
        assert!(parse_decimal("0.000000000000000000001").is_err());
        assert!(parse_decimal(&"9".repeat(100)).is_err());

        // Limits are on significant digits, not on how the value was written
        assert_eq!(parse_decimal("1e19").unwrap(), dec("10000000000000000000"));
        assert!(parse_decimal("1e20").is_err());
        assert_eq!(parse_decimal("1.50000000000000000000000").unwrap(), dec("1.5"));
        assert_eq!(
            parse_decimal("99999999999999999999.99999999999999999999").unwrap(),
            dec("99999999999999999999.99999999999999999999")
        );
    }

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(parse_iso_date("2025-03-05").unwrap(), expected);
        assert_eq!(parse_iso_date("2025-03-05T10:00:00.000Z").unwrap(), expected);
        assert_eq!(parse_br_date("05/03/2025").unwrap(), expected);
        assert!(parse_iso_date("05/03/2025").is_err());
    }
}
