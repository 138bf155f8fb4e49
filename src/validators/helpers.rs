//! Validator helper functions
//!
//! Lexical parsers for the built-in datatypes. Each helper checks the
//! lexical space of one datatype family and returns the Rust value used by
//! [`XsdValue`](super::values::XsdValue).

use crate::error::{Error, Result};
use base64::Engine;
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use super::values::{DateTimeKind, DateTimeValue, DurationValue};

lazy_static::lazy_static! {
    /// XSD boolean value mapping
    pub static ref XSD_BOOLEAN_MAP: HashMap<&'static str, bool> = {
        let mut m = HashMap::new();
        m.insert("false", false);
        m.insert("0", false);
        m.insert("true", true);
        m.insert("1", true);
        m
    };

    static ref DECIMAL_REGEX: Regex = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap();
    static ref INTEGER_REGEX: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref FLOAT_REGEX: Regex =
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap();
    static ref HEX_BINARY_REGEX: Regex = Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap();
    static ref LANGUAGE_REGEX: Regex = Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref DURATION_REGEX: Regex = Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d*)?|\.\d+)S)?)?$"
    ).unwrap();
    static ref TIMEZONE_REGEX: Regex = Regex::new(r"(Z|[+-]\d{2}:\d{2})$").unwrap();
    static ref DATE_PART_REGEXES: HashMap<DateTimeKind, Regex> = {
        let year = r"(-?(?:[1-9]\d{4,}|\d{4}))";
        let time = r"(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)";
        let mut m = HashMap::new();
        m.insert(DateTimeKind::DateTime, format!(r"^{}-(\d{{2}})-(\d{{2}})T{}$", year, time));
        m.insert(DateTimeKind::Date, format!(r"^{}-(\d{{2}})-(\d{{2}})$", year));
        m.insert(DateTimeKind::Time, format!(r"^{}$", time));
        m.insert(DateTimeKind::GYearMonth, format!(r"^{}-(\d{{2}})$", year));
        m.insert(DateTimeKind::GYear, format!(r"^{}$", year));
        m.insert(DateTimeKind::GMonthDay, r"^--(\d{2})-(\d{2})$".to_string());
        m.insert(DateTimeKind::GDay, r"^---(\d{2})$".to_string());
        m.insert(DateTimeKind::GMonth, r"^--(\d{2})(?:--)?$".to_string());
        m.into_iter()
            .map(|(k, v)| (k, Regex::new(&v).unwrap()))
            .collect()
    };
}

// =============================================================================
// Boolean
// =============================================================================

/// Convert XSD boolean string to Rust bool
pub fn boolean_to_rust(value: &str) -> Result<bool> {
    XSD_BOOLEAN_MAP
        .get(value)
        .copied()
        .ok_or_else(|| Error::Value(format!("'{}' is not a valid xs:boolean value", value)))
}

// =============================================================================
// Numbers
// =============================================================================

/// Validate an xs:decimal lexical value
pub fn decimal_validator(value: &str) -> Result<Decimal> {
    if !DECIMAL_REGEX.is_match(value) {
        return Err(Error::Value(format!("'{}' is not a valid xs:decimal value", value)));
    }
    parse_decimal_digits(value)
}

/// Validate an xs:integer lexical value
pub fn integer_validator(value: &str) -> Result<Decimal> {
    if !INTEGER_REGEX.is_match(value) {
        return Err(Error::Value(format!("'{}' is not a valid xs:integer value", value)));
    }
    parse_decimal_digits(value)
}

fn parse_decimal_digits(value: &str) -> Result<Decimal> {
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    let mut normalized = String::with_capacity(value.len() + 2);
    if negative {
        normalized.push('-');
    }
    normalized.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        normalized.push('.');
        normalized.push_str(frac_part);
    }
    Decimal::from_str_exact(&normalized).map_err(|_| {
        Error::Value(format!("'{}' cannot be represented as a decimal value", value))
    })
}

/// Convert XSD float/double string to Rust float
pub fn float_to_rust(value: &str) -> Result<f64> {
    match value {
        "NaN" => Ok(f64::NAN),
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        _ if FLOAT_REGEX.is_match(value) => value
            .parse::<f64>()
            .map_err(|_| Error::Value(format!("'{}' is not a valid float value", value))),
        _ => Err(Error::Value(format!("'{}' is not a valid float value", value))),
    }
}

/// Convert Rust float to XSD float string
pub fn rust_to_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "INF".to_string()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        format!("{:E}", value)
    }
}

/// Number of significant digits of a decimal, and its fraction digits
pub fn decimal_digits(value: &Decimal) -> (u32, u32) {
    let normalized = value.normalize();
    let scale = normalized.scale();
    let mantissa = normalized.mantissa().unsigned_abs();
    let mut digits = 0u32;
    let mut m = mantissa;
    while m > 0 {
        digits += 1;
        m /= 10;
    }
    (digits.max(scale).max(1), scale)
}

// =============================================================================
// Binary
// =============================================================================

/// Validate a hex binary value
pub fn hex_binary_validator(value: &str) -> Result<Vec<u8>> {
    if !HEX_BINARY_REGEX.is_match(value) {
        return Err(Error::Value(format!(
            "'{}' is not a valid hexadecimal encoding",
            value
        )));
    }

    (0..value.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&value[i..i + 2], 16)
                .map_err(|_| Error::Value("invalid hex byte".to_string()))
        })
        .collect()
}

/// Validate a base64 binary value
pub fn base64_binary_validator(value: &str) -> Result<Vec<u8>> {
    let cleaned: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|_| Error::Value(format!("'{}' is not a valid base64 encoding", value)))
}

// =============================================================================
// Strings
// =============================================================================

/// Validate an xs:language value
pub fn language_validator(value: &str) -> Result<()> {
    if LANGUAGE_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::Value(format!("'{}' is not a valid xs:language value", value)))
    }
}

/// Validate an xs:anyURI value
///
/// Only escapes are checked: every `%` must introduce two hex digits and
/// at most one fragment separator may appear.
pub fn any_uri_validator(value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return Err(Error::Value(format!("'{}' is not a valid xs:anyURI value", value)));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    if value.matches('#').count() > 1 {
        return Err(Error::Value(format!("'{}' is not a valid xs:anyURI value", value)));
    }
    Ok(())
}

// =============================================================================
// Durations and dates
// =============================================================================

/// Parse an xs:duration value
pub fn duration_validator(value: &str) -> Result<DurationValue> {
    let invalid = || Error::Value(format!("'{}' is not a valid xs:duration value", value));
    let caps = DURATION_REGEX.captures(value).ok_or_else(invalid)?;

    let has_date = (2..=4).any(|i| caps.get(i).is_some());
    let has_time = (6..=8).any(|i| caps.get(i).is_some());
    if !has_date && !has_time {
        return Err(invalid());
    }
    if caps.get(5).is_some() && !has_time {
        return Err(invalid());
    }

    let int = |i: usize| -> Result<i64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<i64>().map_err(|_| invalid()),
            None => Ok(0),
        }
    };
    let months = int(2)?
        .checked_mul(12)
        .and_then(|y| y.checked_add(int(3).ok()?))
        .ok_or_else(invalid)?;

    let dec = |i: usize| -> Result<Decimal> {
        match caps.get(i) {
            Some(m) => {
                let text = m.as_str();
                let text = text.strip_suffix('.').unwrap_or(text);
                let text = if text.starts_with('.') {
                    format!("0{}", text)
                } else {
                    text.to_string()
                };
                Decimal::from_str(&text).map_err(|_| invalid())
            }
            None => Ok(Decimal::ZERO),
        }
    };
    let seconds = dec(4)? * Decimal::from(86_400)
        + dec(6)? * Decimal::from(3_600)
        + dec(7)? * Decimal::from(60)
        + dec(8)?;

    let negative = caps.get(1).is_some();
    Ok(DurationValue {
        months: if negative { -months } else { months },
        seconds: if negative { -seconds } else { seconds },
    })
}

/// Parse one of the date/time datatypes
pub fn datetime_validator(kind: DateTimeKind, value: &str) -> Result<DateTimeValue> {
    let invalid = || Error::Value(format!("'{}' is not a valid xs:{} value", value, kind.name()));

    let (body, tz) = match TIMEZONE_REGEX.find(value) {
        // offsets always carry a colon, so "---12" is never read as one
        Some(m) => (&value[..m.start()], Some(parse_timezone(m.as_str()).ok_or_else(invalid)?)),
        None => (value, None),
    };

    let regex = DATE_PART_REGEXES.get(&kind).ok_or_else(invalid)?;
    let caps = regex.captures(body).ok_or_else(invalid)?;
    let field = |i: usize| caps.get(i).map(|m| m.as_str());
    let small = |s: Option<&str>| -> Result<u8> {
        s.ok_or_else(invalid)?.parse::<u8>().map_err(|_| invalid())
    };

    let mut dt = DateTimeValue::new(kind);
    match kind {
        DateTimeKind::DateTime | DateTimeKind::Date => {
            dt.year = parse_year(field(1).ok_or_else(invalid)?).ok_or_else(invalid)?;
            dt.month = small(field(2))?;
            dt.day = small(field(3))?;
            if kind == DateTimeKind::DateTime {
                dt.hour = small(field(4))?;
                dt.minute = small(field(5))?;
                dt.second = Decimal::from_str(field(6).ok_or_else(invalid)?).map_err(|_| invalid())?;
            }
        }
        DateTimeKind::Time => {
            dt.hour = small(field(1))?;
            dt.minute = small(field(2))?;
            dt.second = Decimal::from_str(field(3).ok_or_else(invalid)?).map_err(|_| invalid())?;
        }
        DateTimeKind::GYearMonth => {
            dt.year = parse_year(field(1).ok_or_else(invalid)?).ok_or_else(invalid)?;
            dt.month = small(field(2))?;
        }
        DateTimeKind::GYear => {
            dt.year = parse_year(field(1).ok_or_else(invalid)?).ok_or_else(invalid)?;
        }
        DateTimeKind::GMonthDay => {
            dt.month = small(field(1))?;
            dt.day = small(field(2))?;
        }
        DateTimeKind::GDay => {
            dt.day = small(field(1))?;
        }
        DateTimeKind::GMonth => {
            dt.month = small(field(1))?;
        }
    }
    dt.timezone = tz;

    if !(1..=12).contains(&dt.month) || !(1..=31).contains(&dt.day) {
        return Err(invalid());
    }
    if kind.has_day() && kind.has_month() && !is_valid_day(dt.year, dt.month, dt.day) {
        return Err(invalid());
    }
    if dt.minute > 59 || dt.second >= Decimal::from(60) {
        return Err(invalid());
    }
    if dt.hour > 24 || (dt.hour == 24 && (dt.minute != 0 || !dt.second.is_zero())) {
        return Err(invalid());
    }
    Ok(dt)
}

fn parse_year(text: &str) -> Option<i64> {
    let year = text.parse::<i64>().ok()?;
    // there is no year zero
    (year != 0).then_some(year)
}

fn parse_timezone(text: &str) -> Option<i16> {
    if text == "Z" {
        return Some(0);
    }
    let sign: i16 = if text.starts_with('-') { -1 } else { 1 };
    let hours = text[1..3].parse::<i16>().ok()?;
    let minutes = text[4..6].parse::<i16>().ok()?;
    if minutes > 59 || hours > 14 || (hours == 14 && minutes != 0) {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

/// Year with the same leap-year status, inside chrono's range
fn leap_proxy_year(year: i64) -> i32 {
    if year.rem_euclid(400) == 0 {
        2000
    } else if year.rem_euclid(100) == 0 {
        1900
    } else if year.rem_euclid(4) == 0 {
        1972
    } else {
        1971
    }
}

/// Whether a day exists in the given month; gMonthDay values use a leap year
pub fn is_valid_day(year: i64, month: u8, day: u8) -> bool {
    NaiveDate::from_ymd_opt(leap_proxy_year(year), month as u32, day as u32).is_some()
}

/// Number of days in a month
pub fn days_in_month(year: i64, month: u8) -> u8 {
    (28..=31)
        .rev()
        .find(|d| is_valid_day(year, month, *d))
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean() {
        assert!(boolean_to_rust("true").unwrap());
        assert!(!boolean_to_rust("0").unwrap());
        assert!(boolean_to_rust("TRUE").is_err());
    }

    #[test]
    fn test_decimal_lexical() {
        assert_eq!(decimal_validator("1.50").unwrap(), Decimal::new(15, 1));
        assert_eq!(decimal_validator("-.5").unwrap(), Decimal::new(-5, 1));
        assert_eq!(decimal_validator("007").unwrap(), Decimal::from(7));
        assert_eq!(decimal_validator("3.").unwrap(), Decimal::from(3));
        assert!(decimal_validator("1e3").is_err());
        assert!(decimal_validator("abc").is_err());
        assert!(decimal_validator("").is_err());
        assert!(integer_validator("1.0").is_err());
        assert!(integer_validator("+42").is_ok());
    }

    #[test]
    fn test_float_lexical() {
        assert!(float_to_rust("INF").unwrap().is_infinite());
        assert!(float_to_rust("NaN").unwrap().is_nan());
        assert_eq!(float_to_rust("1.5e2").unwrap(), 150.0);
        assert!(float_to_rust("inf").is_err());
        assert!(float_to_rust("infinity").is_err());
        assert!(float_to_rust("+INF").is_err());
    }

    #[test]
    fn test_decimal_digits() {
        assert_eq!(decimal_digits(&Decimal::new(12345, 0)), (5, 0));
        assert_eq!(decimal_digits(&Decimal::new(1234, 1)), (4, 1));
        assert_eq!(decimal_digits(&Decimal::new(5, 2)), (2, 2));
        assert_eq!(decimal_digits(&Decimal::new(1200, 2)), (2, 0));
        assert_eq!(decimal_digits(&Decimal::ZERO), (1, 0));
    }

    #[test]
    fn test_binary() {
        assert_eq!(hex_binary_validator("0fB7").unwrap(), vec![0x0f, 0xb7]);
        assert!(hex_binary_validator("0fB").is_err());
        assert_eq!(base64_binary_validator("aGk=").unwrap(), b"hi".to_vec());
        assert!(base64_binary_validator("a").is_err());
    }

    #[test]
    fn test_duration() {
        let d = duration_validator("P1Y2M3DT4H5M6.5S").unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.seconds, Decimal::new(2_739_065, 1));
        let neg = duration_validator("-PT1M").unwrap();
        assert_eq!(neg.seconds, Decimal::from(-60));
        assert!(duration_validator("P").is_err());
        assert!(duration_validator("P1YT").is_err());
        assert!(duration_validator("PT1.5M").is_err());
    }

    #[test]
    fn test_dates() {
        let dt = datetime_validator(DateTimeKind::DateTime, "2004-04-12T13:20:00-05:00").unwrap();
        assert_eq!((dt.year, dt.month, dt.day, dt.hour), (2004, 4, 12, 13));
        assert_eq!(dt.timezone, Some(-300));
        assert!(datetime_validator(DateTimeKind::Date, "2001-02-29").is_err());
        assert!(datetime_validator(DateTimeKind::Date, "2004-02-29Z").is_ok());
        assert!(datetime_validator(DateTimeKind::Date, "0000-01-01").is_err());
        assert!(datetime_validator(DateTimeKind::Time, "24:00:00").is_ok());
        assert!(datetime_validator(DateTimeKind::Time, "24:00:01").is_err());
        assert!(datetime_validator(DateTimeKind::GMonthDay, "--02-29").is_ok());
        assert!(datetime_validator(DateTimeKind::GDay, "---31").is_ok());
        assert!(datetime_validator(DateTimeKind::GMonth, "--13").is_err());
        assert!(datetime_validator(DateTimeKind::GYear, "-0044").is_ok());
        assert!(datetime_validator(DateTimeKind::DateTime, "2004-04-12T13:20:00+15:00").is_err());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2023, 4), 30);
    }
}
