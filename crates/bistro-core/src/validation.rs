//! # Input Validation
//!
//! Checks applied by the command layer before anything is tracked in a
//! unit of work. Each validator returns the cleaned value.

use crate::error::ValidationError;
use crate::types::setting_keys;
use crate::MAX_LINE_QUANTITY;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 32;
pub const PASSWORD_MIN: usize = 8;
pub const NAME_MAX: usize = 100;
pub const NOTE_MAX: usize = 200;
pub const SEATS_MAX: i64 = 50;
/// 100.00 in basis points.
pub const TAX_BPS_MAX: i64 = 10_000;
/// Keeps a typo from pricing a coffee at 10 000.00.
pub const PRICE_MAX_CENTS: i64 = 1_000_000;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trims and checks a required display name (products, tables, users ...).
pub fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if value.chars().count() > NAME_MAX {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: NAME_MAX,
        });
    }
    Ok(value.to_string())
}

/// Empty notes become `None`.
pub fn validate_note(value: Option<&str>) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(note) if note.chars().count() > NOTE_MAX => Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: NOTE_MAX,
        }),
        Some(note) => Ok(Some(note.to_string())),
    }
}

pub fn validate_username(value: &str) -> ValidationResult<String> {
    let value = value.trim().to_lowercase();
    let len = value.chars().count();
    if len == 0 {
        return Err(ValidationError::required("username"));
    }
    if len < USERNAME_MIN {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: USERNAME_MIN,
        });
    }
    if len > USERNAME_MAX {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: USERNAME_MAX,
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(ValidationError::invalid(
            "username",
            "only letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    Ok(value)
}

pub fn validate_email(value: &str) -> ValidationResult<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(ValidationError::required("email"));
    }

    let Some((local, domain)) = value.split_once('@') else {
        return Err(ValidationError::invalid("email", "missing '@'"));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::invalid("email", "malformed address"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::invalid("email", "malformed domain"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid("email", "contains whitespace"));
    }
    Ok(value)
}

/// At least 8 characters with a letter and a digit.
pub fn validate_password(value: &str) -> ValidationResult<()> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: PASSWORD_MIN,
        });
    }
    if !value.chars().any(char::is_alphabetic) || !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid(
            "password",
            "must contain a letter and a digit",
        ));
    }
    Ok(())
}

pub fn validate_price(cents: i64) -> ValidationResult<i64> {
    in_range("price", cents, 0, PRICE_MAX_CENTS)
}

pub fn validate_quantity(quantity: i64) -> ValidationResult<i64> {
    in_range("quantity", quantity, 1, MAX_LINE_QUANTITY)
}

pub fn validate_seats(seats: i64) -> ValidationResult<i64> {
    in_range("seats", seats, 1, SEATS_MAX)
}

pub fn validate_tax_bps(bps: i64) -> ValidationResult<u32> {
    in_range("tax_rate_bps", bps, 0, TAX_BPS_MAX).map(|v| v as u32)
}

fn in_range(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<i64> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(value)
}

/// Parses a price typed by an operator ("12", "12.5", "12.50") into cents.
pub fn parse_price(input: &str) -> ValidationResult<i64> {
    let input = input.trim().trim_start_matches(['$', '€', '£']);
    let (units, fraction) = match input.split_once('.') {
        Some((u, f)) => (u, f),
        None => (input, ""),
    };

    let bad = || ValidationError::invalid("price", format!("'{input}' is not an amount"));
    if units.is_empty() || fraction.len() > 2 {
        return Err(bad());
    }
    let units: i64 = units.parse().map_err(|_| bad())?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| bad())? * 10,
        _ => fraction.parse().map_err(|_| bad())?,
    };
    if units < 0 {
        return Err(bad());
    }
    validate_price(units * 100 + fraction)
}

/// Validates a known setting's value; unknown keys are rejected.
pub fn validate_setting(key: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    match key {
        setting_keys::TAX_RATE_BPS => {
            let bps: i64 = value
                .parse()
                .map_err(|_| ValidationError::invalid(key, "must be a whole number of basis points"))?;
            validate_tax_bps(bps)?;
            Ok(bps.to_string())
        }
        setting_keys::RESTAURANT_NAME => validate_name(key, value),
        setting_keys::CURRENCY_SYMBOL => {
            if value.is_empty() || value.chars().count() > 3 {
                return Err(ValidationError::invalid(key, "must be 1 to 3 characters"));
            }
            Ok(value.to_string())
        }
        setting_keys::RESTAURANT_ADDRESS | setting_keys::RECEIPT_FOOTER => {
            if value.chars().count() > 200 {
                return Err(ValidationError::TooLong {
                    field: key.to_string(),
                    max: 200,
                });
            }
            Ok(value.to_string())
        }
        _ => Err(ValidationError::NotAllowed {
            field: "setting".to_string(),
            allowed: setting_keys::ALL.iter().map(|k| k.to_string()).collect(),
        }),
    }
}
