//! Literalizer: converts typed host values into syntactically valid SQL
//! literal text.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::constant::SQLSTATE_INVALID_DOMAIN_VALUE;
use crate::error::{Error, Result};

/// A typed host value the wrapping relational API supplies for a bound
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    /// A decimal value rounded and validated against the target column's
    /// declared `(precision, scale)`.
    Decimal {
        value: Decimal,
        precision: u32,
        scale: u32,
    },
    Str(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(NaiveDateTime, FixedOffset),
    Inet(String),
    Json(String),
    Url(String),
    Uuid(uuid::Uuid),
    Xml(String),
}

/// Whether the server is in C-style string mode, which additionally
/// escapes backslashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringEscapeMode {
    pub c_style: bool,
}

/// Converts `value` to the literal SQL text to inline into a query or an
/// `exec id(...)` parameter list.
pub fn literalize(value: &Value, escape: StringEscapeMode) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::I64(i) => Ok(i.to_string()),
        Value::F64(f) => Ok(format_float(*f)),
        Value::Decimal {
            value,
            precision,
            scale,
        } => literalize_decimal(*value, *precision, *scale),
        Value::Str(s) => Ok(quote_string(s, escape)),
        Value::Blob(bytes) => Ok(format!("blob '{}'", hex_encode(bytes))),
        Value::Date(d) => Ok(format!("date '{}'", d.format("%Y-%m-%d"))),
        Value::Time(t) => Ok(format!("time '{}'", format_time(*t))),
        Value::TimeTz(t, tz) => Ok(format!(
            "timetz '{}{}'",
            format_time(*t),
            format_offset(*tz)
        )),
        Value::Timestamp(ts) => Ok(format!(
            "timestamp '{} {}'",
            ts.date().format("%Y-%m-%d"),
            format_time(ts.time())
        )),
        Value::TimestampTz(ts, tz) => Ok(format!(
            "timestamptz '{} {}{}'",
            ts.date().format("%Y-%m-%d"),
            format_time(ts.time()),
            format_offset(*tz)
        )),
        Value::Inet(s) => {
            validate_inet(s)?;
            Ok(format!("inet '{}'", escape_plain(s)))
        }
        Value::Json(s) => {
            validate_json(s)?;
            Ok(format!("json '{}'", escape_plain(s)))
        }
        Value::Url(s) => {
            validate_url(s)?;
            Ok(format!("url '{}'", escape_plain(s)))
        }
        Value::Uuid(u) => Ok(format!("uuid '{u}'")),
        Value::Xml(s) => Ok(format!("xml '{}'", escape_plain(s))),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "'NaN'".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "'Infinity'" } else { "'-Infinity'" }.to_string()
    } else {
        format!("{f}")
    }
}

fn format_time(t: NaiveTime) -> String {
    format!("{}.{:03}", t.format("%H:%M:%S"), t.nanosecond() / 1_000_000)
}

fn format_offset(tz: FixedOffset) -> String {
    let total_minutes = tz.local_minus_utc() / 60;
    let sign = if total_minutes < 0 { '-' } else { '+' };
    let abs = total_minutes.abs();
    format!("{sign}{:02}:{:02}", abs / 60, abs % 60)
}

/// HALF_UP round to `scale`, then reject if the rounded value's precision
/// exceeds `precision`; trims leading zeros except the sign and the single
/// zero before the decimal point.
fn literalize_decimal(value: Decimal, precision: u32, scale: u32) -> Result<String> {
    let rounded = value.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    let digit_count = rounded
        .mantissa()
        .unsigned_abs()
        .to_string()
        .trim_start_matches('0')
        .len()
        .max(1) as u32;
    if digit_count > precision {
        return Err(Error::data_conversion(
            "22003",
            format!(
                "decimal value {rounded} has {digit_count} digits, exceeds target precision {precision}"
            ),
        ));
    }
    Ok(trim_decimal_text(&rounded.to_string()))
}

fn trim_decimal_text(text: &str) -> String {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(r) => ("-", r),
        None => ("", text),
    };
    let trimmed = rest.trim_start_matches('0');
    let trimmed = if trimmed.starts_with('.') {
        format!("0{trimmed}")
    } else if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    };
    format!("{sign}{trimmed}")
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SQL-standard single-quote doubling, plus backslash escaping when the
/// server is in C-style string mode.
fn quote_string(s: &str, escape: StringEscapeMode) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' if escape.c_style => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Plain single-quote doubling for domain-type literals, which are never
/// subject to C-style backslash escaping (their content is pre-validated).
fn escape_plain(s: &str) -> String {
    s.replace('\'', "''")
}

fn validate_inet(s: &str) -> Result<()> {
    s.parse::<cidr::IpInet>()
        .or_else(|_| s.parse::<std::net::IpAddr>().map(cidr::IpInet::new_host))
        .map(|_| ())
        .map_err(|_| {
            Error::data_conversion(
                SQLSTATE_INVALID_DOMAIN_VALUE,
                format!("'{s}' is not a valid inet address"),
            )
        })
}

fn validate_url(s: &str) -> Result<()> {
    url::Url::parse(s).map(|_| ()).map_err(|_| {
        Error::data_conversion(
            SQLSTATE_INVALID_DOMAIN_VALUE,
            format!("'{s}' is not a valid url"),
        )
    })
}

/// Recognizes the shape of a JSON value by checking that the first and
/// last non-whitespace characters agree on object/array/string/literal/
/// number. This is a cheap syntactic pre-check, not a full parse — the
/// server performs full validation.
fn validate_json(s: &str) -> Result<()> {
    let trimmed = s.trim();
    let err = || {
        Error::data_conversion(
            SQLSTATE_INVALID_DOMAIN_VALUE,
            format!("'{s}' is not a recognizable json value"),
        )
    };
    let first = trimmed.chars().next().ok_or_else(err)?;
    let last = trimmed.chars().next_back().ok_or_else(err)?;
    let ok = matches!(
        (first, last),
        ('{', '}') | ('[', ']') | ('"', '"')
    ) || is_json_literal_or_number(trimmed);
    if ok { Ok(()) } else { Err(err()) }
}

fn is_json_literal_or_number(s: &str) -> bool {
    matches!(s, "true" | "false" | "null") || s.parse::<f64>().is_ok()
}

/// Rounds `f` away-from-zero on a tie; exposed so `Value::F64` conversions
/// that need decimal-precision literalization can reuse the decimal path
/// by going through `Decimal::from_f64_retain` upstream.
pub fn decimal_from_f64(f: f64) -> Option<Decimal> {
    Decimal::try_from(f).ok().or_else(|| f.to_i64().map(Decimal::from))
}
