//! Integral Kubernetes quantity arithmetic
//!
//! Extended resources such as `sgx.intel.com/epc` are always whole numbers, so
//! this module only deals with quantities that resolve to an `i64`. Anything
//! fractional after applying the suffix (`100m`, `1.5`) is rejected.
//!
//! Formatting follows the apimachinery canonical form for the binary-SI
//! format: small magnitudes are printed in decimal-SI, everything else divides
//! out powers of 1024 while the division is exact.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::{Error, Result};

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];

/// Scale implied by a quantity suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    /// Multiply by `1024^n`
    Binary(u32),
    /// Multiply by `10^n`
    Decimal(i32),
}

/// Parse a quantity string into an integral value.
pub fn parse_quantity(text: &str) -> Result<i64> {
    let s = text.trim();
    if s.is_empty() {
        return Err(Error::quantity(text, "empty quantity"));
    }

    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::quantity(text, "missing numeric value"));
    }
    if frac_part.contains('.') {
        return Err(Error::quantity(text, "more than one decimal point"));
    }

    let digits = format!("{int_part}{frac_part}");
    let mantissa: i128 = digits
        .parse()
        .map_err(|_| Error::quantity(text, "numeric value out of range"))?;
    let frac_len = u32::try_from(frac_part.len())
        .map_err(|_| Error::quantity(text, "numeric value out of range"))?;

    let magnitude = match parse_suffix(suffix).ok_or_else(|| {
        Error::quantity(text, format!("unknown suffix '{suffix}'"))
    })? {
        Scale::Binary(power) => {
            let scaled = 1024i128
                .checked_pow(power)
                .and_then(|m| mantissa.checked_mul(m))
                .ok_or_else(|| Error::quantity(text, "value out of range"))?;
            divide_exact(text, scaled, frac_len)?
        }
        Scale::Decimal(exponent) => {
            let shift = i64::from(exponent) - i64::from(frac_len);
            if shift >= 0 {
                u32::try_from(shift)
                    .ok()
                    .and_then(|p| 10i128.checked_pow(p))
                    .and_then(|m| mantissa.checked_mul(m))
                    .ok_or_else(|| Error::quantity(text, "value out of range"))?
            } else {
                let places = u32::try_from(-shift)
                    .map_err(|_| Error::quantity(text, "exponent out of range"))?;
                divide_exact(text, mantissa, places)?
            }
        }
    };

    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).map_err(|_| Error::quantity(text, "value does not fit in 64 bits"))
}

/// Parse the numeric value of a `Quantity`.
pub fn quantity_value(quantity: &Quantity) -> Result<i64> {
    parse_quantity(&quantity.0)
}

/// Render an integral value in canonical binary-SI form.
pub fn format_binary_si(value: i64) -> String {
    if value > -1024 && value < 1024 {
        return format_decimal_si(value);
    }

    let mut number = value;
    let mut power = 0;
    while power < BINARY_SUFFIXES.len() - 1 && number % 1024 == 0 {
        number /= 1024;
        power += 1;
    }
    format!("{number}{}", BINARY_SUFFIXES[power])
}

fn format_decimal_si(value: i64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut number = value;
    let mut power = 0;
    while power < DECIMAL_SUFFIXES.len() - 1 && number % 1000 == 0 {
        number /= 1000;
        power += 1;
    }
    format!("{number}{}", DECIMAL_SUFFIXES[power])
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "Ki" => Scale::Binary(1),
        "Mi" => Scale::Binary(2),
        "Gi" => Scale::Binary(3),
        "Ti" => Scale::Binary(4),
        "Pi" => Scale::Binary(5),
        "Ei" => Scale::Binary(6),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            Scale::Decimal(exponent.parse().ok()?)
        }
    };
    Some(scale)
}

fn divide_exact(text: &str, value: i128, places: u32) -> Result<i128> {
    if value == 0 {
        return Ok(0);
    }
    let divisor = 10i128
        .checked_pow(places)
        .ok_or_else(|| Error::quantity(text, "not an integral value"))?;
    if value % divisor != 0 {
        return Err(Error::quantity(text, "not an integral value"));
    }
    Ok(value / divisor)
}
