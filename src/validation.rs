//! Input validation shared by the HTTP handlers and the import tool.
//!
//! Only presence and shape of identifying fields are checked; amounts and
//! percentages are accepted as given.
use crate::errors::AppError;
use crate::formatting::{tax_id_digits, TAX_ID_DIGITS};
use regex::Regex;
use std::sync::LazyLock;

// RFC 5322 simplified: local@domain.tld
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is valid")
});

/// Validate email address
///
/// Checks for:
/// - Minimum length and the presence of `@` and `.`
/// - Simplified RFC 5322 structure
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    if !EMAIL_REGEX.is_match(email) {
        tracing::warn!("Invalid email format: {}", email);
        return false;
    }

    true
}

/// Returns the trimmed value, or `BadRequest` naming the field when blank.
pub fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// A stored CNPJ must be complete (14 digits), whatever its punctuation.
pub fn require_complete_tax_id(raw: &str) -> Result<(), AppError> {
    let digits = tax_id_digits(raw).len();
    if digits != TAX_ID_DIGITS {
        return Err(AppError::BadRequest(format!(
            "tax_id must contain {} digits, got {}",
            TAX_ID_DIGITS, digits
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user+tag@example.co.uk"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_require_text_trims() {
        assert_eq!(require_text("name", "  Loja Centro ").unwrap(), "Loja Centro");
        assert!(matches!(
            require_text("name", "   "),
            Err(AppError::BadRequest(msg)) if msg == "name is required"
        ));
    }

    #[test]
    fn test_tax_id_must_be_complete() {
        assert!(require_complete_tax_id("12.345.678/0001-95").is_ok());
        assert!(require_complete_tax_id("12345678000195").is_ok());
        assert!(require_complete_tax_id("12.345.678/0001").is_err());
        assert!(require_complete_tax_id("").is_err());
    }
}
