//! Base-unit ↔ human decimal conversion for token amounts.
//!
//! Everything here works on integers and digit strings; no floating point is
//! involved, so amounts wider than an `f64` mantissa survive unchanged.

use thiserror::Error;

/// Fraction digits shown when the caller does not ask for a specific limit.
pub const DEFAULT_MAX_FRACTION_DIGITS: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("'{0}' is not a non-negative integer")]
    NotAnInteger(String),

    #[error("'{0}' is not a decimal amount")]
    NotADecimal(String),

    #[error("'{value}' has more than {decimals} fraction digits")]
    TooPrecise { value: String, decimals: u32 },

    #[error("'{0}' does not fit in 128 bits of base units")]
    Overflow(String),
}

/// Render `amount` base units as a decimal string with `decimals` places.
///
/// Trailing zeros of the fractional part are trimmed and the remainder is
/// truncated (not rounded) to `max_fraction_digits`. A fractional part that
/// ends up empty renders the integer part alone.
pub fn format_token_amount(amount: u128, decimals: u32, max_fraction_digits: usize) -> String {
    let digits = amount.to_string();
    split_digits(&digits, decimals, max_fraction_digits)
}

/// [`format_token_amount`] with [`DEFAULT_MAX_FRACTION_DIGITS`].
pub fn format_default(amount: u128, decimals: u32) -> String {
    format_token_amount(amount, decimals, DEFAULT_MAX_FRACTION_DIGITS)
}

/// Same as [`format_token_amount`] for integers of any width given as a
/// string of ASCII digits.
pub fn format_digits(
    digits: &str,
    decimals: u32,
    max_fraction_digits: usize,
) -> Result<String, AmountError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::NotAnInteger(digits.to_string()));
    }
    Ok(split_digits(digits, decimals, max_fraction_digits))
}

fn split_digits(digits: &str, decimals: u32, max_fraction_digits: usize) -> String {
    let decimals = decimals as usize;
    let significant = digits.trim_start_matches('0');
    let padded;
    let digits = if significant.len() <= decimals {
        padded = format!("{significant:0>width$}", width = decimals + 1);
        padded.as_str()
    } else {
        significant
    };

    let (integer, fraction) = digits.split_at(digits.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    let fraction = &fraction[..fraction.len().min(max_fraction_digits)];
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Parse a human decimal string (`"12"`, `"12.5"`) into base units.
pub fn parse_token_amount(value: &str, decimals: u32) -> Result<u128, AmountError> {
    let trimmed = value.trim();
    let (integer, fraction) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if integer.is_empty() || !all_digits(integer) || !all_digits(fraction) {
        return Err(AmountError::NotADecimal(value.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            value: value.to_string(),
            decimals,
        });
    }

    let overflow = || AmountError::Overflow(value.to_string());
    let scale = 10u128.checked_pow(decimals).ok_or_else(overflow)?;
    let whole: u128 = integer.parse().map_err(|_| overflow())?;
    let frac_units: u128 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = decimals as usize);
        padded.parse().map_err(|_| overflow())?
    };

    whole
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(overflow)
}
