//! Unit parsing and conversion.
//!
//! Collectors report capacities as raw byte counts, KiB counts (Windows
//! `EstimatedSize`) or display strings ("16 GB", "500.28 GB"). Everything is
//! normalized to exact bytes first, then converted to GB for presentation.
//!
//! Size parsing uses rational arithmetic with half-up rounding, no floats.
//! K/M/G/T (with or without `i`/`B`) are all treated as base-2.

use serde_json::Value;
use thiserror::Error;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Why a size string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    #[error("negative size")]
    NegativeValue,
    #[error("no digits")]
    EmptyNumber,
    #[error("invalid number")]
    InvalidNumber,
    #[error("unknown size suffix `{0}`")]
    UnknownSuffix(String),
    #[error("size overflows u64")]
    Overflow,
}

/// Parse a size string like "4.2G", "16 GB" or "1024" into exact bytes.
///
/// Policy: round to nearest byte, ties half up.
pub fn parse_size(s: &str) -> Result<u64, SizeError> {
    let s = s.trim();

    if s.starts_with('-') {
        return Err(SizeError::NegativeValue);
    }
    if s.starts_with('+') {
        return Err(SizeError::InvalidNumber);
    }

    let (num_str, suffix) = split_numeric_suffix(s);
    if num_str.is_empty() || num_str == "." {
        return Err(SizeError::EmptyNumber);
    }

    let multiplier: u128 = match suffix.to_uppercase().as_str() {
        "K" | "KI" | "KIB" | "KB" => 1024,
        "M" | "MI" | "MIB" | "MB" => 1024 * 1024,
        "G" | "GI" | "GIB" | "GB" => 1024 * 1024 * 1024,
        "T" | "TI" | "TIB" | "TB" => 1024 * 1024 * 1024 * 1024,
        "B" | "BYTES" | "" => 1,
        _ => return Err(SizeError::UnknownSuffix(suffix.to_string())),
    };

    let (numerator, denominator) = parse_decimal_rational(num_str)?;

    let scaled = numerator
        .checked_mul(multiplier)
        .ok_or(SizeError::Overflow)?;
    let doubled = scaled.checked_mul(2).ok_or(SizeError::Overflow)?;
    let doubled_denom = denominator.checked_mul(2).ok_or(SizeError::Overflow)?;
    let bytes = doubled
        .checked_add(denominator)
        .ok_or(SizeError::Overflow)?
        / doubled_denom;

    bytes.try_into().map_err(|_| SizeError::Overflow)
}

/// Split "16 GB" into ("16", "GB"). Whitespace between the parts is dropped.
fn split_numeric_suffix(s: &str) -> (&str, &str) {
    let suffix_start = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    (s[..suffix_start].trim_end(), s[suffix_start..].trim())
}

/// "4.2" → (42, 10), "500" → (500, 1), "0.125" → (125, 1000).
/// Thousands separators are not accepted.
fn parse_decimal_rational(s: &str) -> Result<(u128, u128), SizeError> {
    if let Some((int_part, frac_part)) = s.split_once('.') {
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(SizeError::EmptyNumber);
        }

        let int_val: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| SizeError::InvalidNumber)?
        };
        let frac_val: u128 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| SizeError::InvalidNumber)?
        };

        let denominator: u128 = 10u128
            .checked_pow(frac_part.len() as u32)
            .ok_or(SizeError::Overflow)?;
        let numerator = int_val
            .checked_mul(denominator)
            .ok_or(SizeError::Overflow)?
            .checked_add(frac_val)
            .ok_or(SizeError::Overflow)?;

        Ok((numerator, denominator))
    } else {
        let val: u128 = s.parse().map_err(|_| SizeError::InvalidNumber)?;
        Ok((val, 1))
    }
}

/// Byte count from a raw value: a number of bytes or a size string.
pub fn bytes_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(_) => crate::reconcile::as_u64(value),
        Value::String(s) => parse_size(s).ok(),
        _ => None,
    }
}

/// Byte count from a raw value expressed in KiB (bare numbers) or a size string.
pub fn bytes_from_kib_value(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) if s.trim().chars().all(|c| c.is_ascii_digit() || c == '.') => {
            crate::reconcile::as_u64(value).and_then(|kib| kib.checked_mul(1024))
        }
        Value::String(s) => parse_size(s).ok(),
        _ => crate::reconcile::as_u64(value).and_then(|kib| kib.checked_mul(1024)),
    }
}

/// Bytes to GB (base-2), rounded to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / GIB)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
