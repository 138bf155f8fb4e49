//! Typed values of simple types
//!
//! [`parse_value`] maps a lexical form to a point of a built-in value space,
//! [`compare_values`] orders two values (partially, as XSD requires) and
//! [`canonical`] renders a value back for diagnostics and key-sequences.

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};
use crate::names;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use super::builtins::{BuiltinType, Primitive};
use super::helpers::{self, days_in_month};

/// Result of comparing two values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueOrder {
    /// First is smaller
    Less,
    /// Equal values
    Equal,
    /// First is greater
    Greater,
    /// Not in the same ordered value space, or a partial-order gap
    Incomparable,
}

impl From<Ordering> for ValueOrder {
    fn from(o: Ordering) -> Self {
        match o {
            Ordering::Less => ValueOrder::Less,
            Ordering::Equal => ValueOrder::Equal,
            Ordering::Greater => ValueOrder::Greater,
        }
    }
}

/// Date/time datatype of a [`DateTimeValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    /// xs:dateTime
    DateTime,
    /// xs:date
    Date,
    /// xs:time
    Time,
    /// xs:gYearMonth
    GYearMonth,
    /// xs:gYear
    GYear,
    /// xs:gMonthDay
    GMonthDay,
    /// xs:gDay
    GDay,
    /// xs:gMonth
    GMonth,
}

impl DateTimeKind {
    /// Local name of the datatype
    pub fn name(self) -> &'static str {
        match self {
            DateTimeKind::DateTime => "dateTime",
            DateTimeKind::Date => "date",
            DateTimeKind::Time => "time",
            DateTimeKind::GYearMonth => "gYearMonth",
            DateTimeKind::GYear => "gYear",
            DateTimeKind::GMonthDay => "gMonthDay",
            DateTimeKind::GDay => "gDay",
            DateTimeKind::GMonth => "gMonth",
        }
    }

    pub(crate) fn has_month(self) -> bool {
        matches!(
            self,
            DateTimeKind::DateTime
                | DateTimeKind::Date
                | DateTimeKind::GYearMonth
                | DateTimeKind::GMonthDay
                | DateTimeKind::GMonth
        )
    }

    pub(crate) fn has_day(self) -> bool {
        matches!(
            self,
            DateTimeKind::DateTime | DateTimeKind::Date | DateTimeKind::GMonthDay | DateTimeKind::GDay
        )
    }

    pub(crate) fn has_time(self) -> bool {
        matches!(self, DateTimeKind::DateTime | DateTimeKind::Time)
    }
}

/// A date/time value; fields absent from the datatype hold reference values
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeValue {
    /// Datatype
    pub kind: DateTimeKind,
    /// Year (never zero)
    pub year: i64,
    /// Month 1..=12
    pub month: u8,
    /// Day 1..=31
    pub day: u8,
    /// Hour 0..=24
    pub hour: u8,
    /// Minute
    pub minute: u8,
    /// Seconds with fraction
    pub second: Decimal,
    /// Offset from UTC in minutes
    pub timezone: Option<i16>,
}

impl DateTimeValue {
    /// Reference value for a datatype
    pub fn new(kind: DateTimeKind) -> Self {
        Self {
            kind,
            year: 1972,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: Decimal::ZERO,
            timezone: None,
        }
    }

    /// Seconds on a proleptic timeline, as if the value were in UTC
    fn local_seconds(&self) -> Decimal {
        let days = days_from_civil(self.year, self.month, self.day);
        Decimal::from(days) * Decimal::from(86_400)
            + Decimal::from(self.hour as i64 * 3_600 + self.minute as i64 * 60)
            + self.second
    }

    /// Seconds on the timeline, normalized to UTC when a timezone is present
    fn timeline(&self) -> Decimal {
        let offset = Decimal::from(self.timezone.unwrap_or(0) as i64 * 60);
        self.local_seconds() - offset
    }
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = month as i64;
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// An xs:duration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationValue {
    /// Years and months, in months
    pub months: i64,
    /// Days, hours, minutes and seconds, in seconds
    pub seconds: Decimal,
}

/// A value of a simple type
#[derive(Debug, Clone, PartialEq)]
pub enum XsdValue {
    /// string and every type derived from it
    String(String),
    /// boolean
    Boolean(bool),
    /// decimal and the integer family
    Decimal(Decimal),
    /// float, stored with single precision
    Float(f64),
    /// double
    Double(f64),
    /// duration
    Duration(DurationValue),
    /// the seven date/time primitives
    DateTime(DateTimeValue),
    /// hexBinary
    HexBinary(Vec<u8>),
    /// base64Binary
    Base64Binary(Vec<u8>),
    /// anyURI
    AnyUri(String),
    /// QName
    QName(QName),
    /// NOTATION
    Notation(QName),
    /// list types
    List(Vec<XsdValue>),
}

impl XsdValue {
    /// Number of units measured by the length facets, if they apply
    pub fn length(&self) -> Option<usize> {
        match self {
            XsdValue::String(s) | XsdValue::AnyUri(s) => Some(s.chars().count()),
            XsdValue::HexBinary(b) | XsdValue::Base64Binary(b) => Some(b.len()),
            XsdValue::List(items) => Some(items.len()),
            // length facets are always satisfied by QName and NOTATION
            _ => None,
        }
    }

    /// Decimal payload
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            XsdValue::Decimal(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for XsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&canonical(self))
    }
}

/// Parse a lexical value of a built-in type.
///
/// The lexical value is whitespace-normalized with the type's own rule
/// first. QName and NOTATION values need the in-scope namespaces.
pub fn parse_value(
    builtin: BuiltinType,
    lexical: &str,
    namespaces: Option<&NamespaceContext>,
) -> Result<XsdValue> {
    let normalized = builtin.white_space().normalize(lexical);
    let value = normalized.as_str();

    if let Some(item) = builtin.list_item() {
        let items = value
            .split_whitespace()
            .map(|token| parse_value(item, token, namespaces))
            .collect::<Result<Vec<_>>>()?;
        if items.is_empty() {
            return Err(Error::Value(format!(
                "'{}' is not a valid xs:{} value: at least one item is required",
                lexical,
                builtin.name()
            )));
        }
        return Ok(XsdValue::List(items));
    }

    let invalid = |what: &str| Error::Value(format!("'{}' is not a valid xs:{} value", value, what));

    match builtin.primitive() {
        Primitive::AnySimpleType => Ok(XsdValue::String(value.to_string())),
        Primitive::String => {
            check_string_family(builtin, value).map_err(|_| invalid(builtin.name()))?;
            Ok(XsdValue::String(value.to_string()))
        }
        Primitive::Boolean => helpers::boolean_to_rust(value).map(XsdValue::Boolean),
        Primitive::Decimal => {
            let d = if builtin == BuiltinType::Decimal {
                helpers::decimal_validator(value)?
            } else {
                helpers::integer_validator(value)?
            };
            if let Some((min, max)) = builtin.integer_bounds() {
                let below = min.map_or(false, |m| d < m);
                let above = max.map_or(false, |m| d > m);
                if below || above {
                    return Err(Error::Value(format!(
                        "'{}' is out of the range of xs:{}",
                        value,
                        builtin.name()
                    )));
                }
            }
            Ok(XsdValue::Decimal(d))
        }
        Primitive::Float => {
            helpers::float_to_rust(value).map(|f| XsdValue::Float((f as f32) as f64))
        }
        Primitive::Double => helpers::float_to_rust(value).map(XsdValue::Double),
        Primitive::Duration => helpers::duration_validator(value).map(XsdValue::Duration),
        Primitive::DateTime(kind) => helpers::datetime_validator(kind, value).map(XsdValue::DateTime),
        Primitive::HexBinary => helpers::hex_binary_validator(value).map(XsdValue::HexBinary),
        Primitive::Base64Binary => {
            helpers::base64_binary_validator(value).map(XsdValue::Base64Binary)
        }
        Primitive::AnyUri => {
            helpers::any_uri_validator(value)?;
            Ok(XsdValue::AnyUri(value.to_string()))
        }
        Primitive::QName | Primitive::Notation => {
            if !names::is_valid_qname(value) {
                return Err(invalid(builtin.name()));
            }
            let qname = match namespaces {
                Some(ns) => ns.resolve(value)?,
                None => {
                    let (prefix, local) = names::split_qname(value);
                    if prefix.is_some() {
                        return Err(Error::Namespace(format!(
                            "no namespace context to resolve '{}'",
                            value
                        )));
                    }
                    QName::local(local)
                }
            };
            Ok(if builtin.primitive() == Primitive::QName {
                XsdValue::QName(qname)
            } else {
                XsdValue::Notation(qname)
            })
        }
    }
}

fn check_string_family(builtin: BuiltinType, value: &str) -> Result<()> {
    let ok = match builtin {
        BuiltinType::NormalizedString => !value.contains(['\t', '\n', '\r']),
        BuiltinType::Token => {
            !value.contains(['\t', '\n', '\r'])
                && !value.starts_with(' ')
                && !value.ends_with(' ')
                && !value.contains("  ")
        }
        BuiltinType::Language => return helpers::language_validator(value),
        BuiltinType::Name => names::is_valid_name(value),
        BuiltinType::NCName | BuiltinType::Id | BuiltinType::IdRef | BuiltinType::Entity => {
            names::is_valid_ncname(value)
        }
        BuiltinType::NmToken => names::is_valid_nmtoken(value),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Value(format!("'{}' is not a valid xs:{}", value, builtin.name())))
    }
}

/// Compare two values.
///
/// Values of different primitive value spaces are incomparable, except
/// that float and double compare numerically. Date/time values follow the
/// partial order with the 14 hour rule for mixed timezone presence, and
/// durations are compared through four reference dateTimes.
pub fn compare_values(a: &XsdValue, b: &XsdValue) -> ValueOrder {
    use XsdValue::*;
    match (a, b) {
        (Decimal(x), Decimal(y)) => x.cmp(y).into(),
        (Float(x) | Double(x), Float(y) | Double(y)) => match x.partial_cmp(y) {
            Some(o) => o.into(),
            None => ValueOrder::Incomparable,
        },
        (DateTime(x), DateTime(y)) if x.kind == y.kind => compare_datetimes(x, y),
        (Duration(x), Duration(y)) => compare_durations(x, y),
        (String(x), String(y)) | (AnyUri(x), AnyUri(y)) => {
            if x == y {
                ValueOrder::Equal
            } else {
                ValueOrder::Incomparable
            }
        }
        (Boolean(x), Boolean(y)) => eq_order(x == y),
        (HexBinary(x), HexBinary(y)) | (Base64Binary(x), Base64Binary(y)) => eq_order(x == y),
        (QName(x), QName(y)) | (Notation(x), Notation(y)) => eq_order(x == y),
        (List(x), List(y)) => {
            let same = x.len() == y.len()
                && x.iter().zip(y).all(|(p, q)| compare_values(p, q) == ValueOrder::Equal);
            eq_order(same)
        }
        _ => ValueOrder::Incomparable,
    }
}

fn eq_order(equal: bool) -> ValueOrder {
    if equal {
        ValueOrder::Equal
    } else {
        ValueOrder::Incomparable
    }
}

/// Value-space equality
pub fn values_equal(a: &XsdValue, b: &XsdValue) -> bool {
    compare_values(a, b) == ValueOrder::Equal
}

fn compare_datetimes(p: &DateTimeValue, q: &DateTimeValue) -> ValueOrder {
    let fourteen_hours = Decimal::from(14 * 3_600);
    match (p.timezone.is_some(), q.timezone.is_some()) {
        (true, true) | (false, false) => p.timeline().cmp(&q.timeline()).into(),
        (true, false) => {
            let pt = p.timeline();
            let ql = q.local_seconds();
            if pt < ql - fourteen_hours {
                ValueOrder::Less
            } else if pt > ql + fourteen_hours {
                ValueOrder::Greater
            } else {
                ValueOrder::Incomparable
            }
        }
        (false, true) => match compare_datetimes(q, p) {
            ValueOrder::Less => ValueOrder::Greater,
            ValueOrder::Greater => ValueOrder::Less,
            other => other,
        },
    }
}

fn add_duration(start: (i64, u8, u8), duration: &DurationValue) -> Decimal {
    let (year, month, day) = start;
    let total = year * 12 + (month as i64 - 1) + duration.months;
    let new_year = total.div_euclid(12);
    let new_month = (total.rem_euclid(12) + 1) as u8;
    let new_day = day.min(days_in_month(new_year, new_month));
    Decimal::from(days_from_civil(new_year, new_month, new_day)) * Decimal::from(86_400)
        + duration.seconds
}

fn compare_durations(a: &DurationValue, b: &DurationValue) -> ValueOrder {
    if a.months == b.months {
        return a.seconds.cmp(&b.seconds).into();
    }
    const REFERENCES: [(i64, u8, u8); 4] = [(1696, 9, 1), (1697, 2, 1), (1903, 3, 1), (1903, 7, 1)];
    let mut result: Option<Ordering> = None;
    for start in REFERENCES {
        let order = add_duration(start, a).cmp(&add_duration(start, b));
        match result {
            None => result = Some(order),
            Some(prev) if prev != order => return ValueOrder::Incomparable,
            _ => {}
        }
    }
    result.map_or(ValueOrder::Incomparable, Into::into)
}

/// Canonical lexical representation
pub fn canonical(value: &XsdValue) -> String {
    match value {
        XsdValue::String(s) | XsdValue::AnyUri(s) => s.clone(),
        XsdValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
        XsdValue::Decimal(d) => d.normalize().to_string(),
        XsdValue::Float(f) | XsdValue::Double(f) => helpers::rust_to_float(*f),
        XsdValue::Duration(d) => canonical_duration(d),
        XsdValue::DateTime(dt) => canonical_datetime(dt),
        XsdValue::HexBinary(b) => b.iter().map(|byte| format!("{:02X}", byte)).collect(),
        XsdValue::Base64Binary(b) => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(b)
        }
        XsdValue::QName(q) | XsdValue::Notation(q) => q.to_string(),
        XsdValue::List(items) => items.iter().map(canonical).collect::<Vec<_>>().join(" "),
    }
}

fn canonical_duration(d: &DurationValue) -> String {
    let negative = d.months < 0 || (d.seconds.is_sign_negative() && !d.seconds.is_zero());
    let months = d.months.unsigned_abs();
    let seconds = d.seconds.abs();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    let (years, months) = (months / 12, months % 12);
    if years > 0 {
        out.push_str(&format!("{}Y", years));
    }
    if months > 0 {
        out.push_str(&format!("{}M", months));
    }
    let day = Decimal::from(86_400);
    let days = (seconds / day).trunc().normalize();
    let rest = seconds - days * day;
    if !days.is_zero() {
        out.push_str(&format!("{}D", days));
    }
    if !rest.is_zero() {
        out.push('T');
        let hours = (rest / Decimal::from(3_600)).trunc().normalize();
        let rest = rest - hours * Decimal::from(3_600);
        let minutes = (rest / Decimal::from(60)).trunc().normalize();
        let secs = rest - minutes * Decimal::from(60);
        if !hours.is_zero() {
            out.push_str(&format!("{}H", hours));
        }
        if !minutes.is_zero() {
            out.push_str(&format!("{}M", minutes));
        }
        if !secs.is_zero() {
            out.push_str(&format!("{}S", secs.normalize()));
        }
    }
    if out.ends_with('P') {
        out.push_str("T0S");
    }
    out
}

fn canonical_datetime(dt: &DateTimeValue) -> String {
    let mut out = String::new();
    let year = if dt.year < 0 {
        format!("-{:04}", -dt.year)
    } else {
        format!("{:04}", dt.year)
    };
    match dt.kind {
        DateTimeKind::DateTime => out.push_str(&format!("{}-{:02}-{:02}T", year, dt.month, dt.day)),
        DateTimeKind::Date => out.push_str(&format!("{}-{:02}-{:02}", year, dt.month, dt.day)),
        DateTimeKind::Time => {}
        DateTimeKind::GYearMonth => out.push_str(&format!("{}-{:02}", year, dt.month)),
        DateTimeKind::GYear => out.push_str(&year),
        DateTimeKind::GMonthDay => out.push_str(&format!("--{:02}-{:02}", dt.month, dt.day)),
        DateTimeKind::GDay => out.push_str(&format!("---{:02}", dt.day)),
        DateTimeKind::GMonth => out.push_str(&format!("--{:02}", dt.month)),
    }
    if dt.kind.has_time() {
        let second = dt.second.normalize();
        let whole = second.trunc();
        out.push_str(&format!("{:02}:{:02}:{:0>2}", dt.hour, dt.minute, whole.to_string()));
        let frac = second - whole;
        if !frac.is_zero() {
            let text = frac.to_string();
            out.push_str(text.trim_start_matches('0'));
        }
    }
    match dt.timezone {
        Some(0) => out.push('Z'),
        Some(tz) => {
            let sign = if tz < 0 { '-' } else { '+' };
            out.push_str(&format!("{}{:02}:{:02}", sign, tz.abs() / 60, tz.abs() % 60));
        }
        None => {}
    }
    out
}
