//! Coercion between raw values and domain-typed [`Value`]s
//!
//! Two entry points cover the two kinds of input:
//!
//! - [`coerce`] takes a raw JSON value, as found in filter specifications,
//!   wire responses and table files.
//! - [`convert`] takes an already-typed [`Value`] and converts it to another
//!   domain type (e.g. a DateTime truncated to a Date).
//!
//! Both are strict: String rejects null, lists and objects; Number and the
//! temporal types fail on input they cannot interpret. Boolean never fails
//! and defaults to `false`.
//!
//! [`ColumnConversion`] is the lenient variant used for bulk ingestion, where
//! an unparsable cell falls back to a per-column default instead of failing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{InvalidDataError, Result};
use crate::types::{DomainType, Number, Row, Value};

/// Strings accepted as `true`, compared case-insensitively
const TRUTHY: [&str; 4] = ["true", "t", "1", "1.0"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

// =============================================================================
// Strict coercion
// =============================================================================

/// Coerce a raw JSON value to `ty`
pub fn coerce(ty: DomainType, raw: &JsonValue) -> Result<Value> {
    match ty {
        DomainType::String => match raw {
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            JsonValue::Number(_) | JsonValue::Bool(_) => Ok(Value::String(raw.to_string())),
            _ => Err(InvalidDataError::coercion(raw, ty)),
        },
        DomainType::Number => match raw {
            JsonValue::Number(n) => Ok(Value::Number(json_number(n))),
            JsonValue::Bool(b) => Ok(Value::Number(Number::Int(i64::from(*b)))),
            JsonValue::String(s) => parse_number(s)
                .map(Value::Number)
                .ok_or_else(|| InvalidDataError::coercion(raw, ty)),
            _ => Err(InvalidDataError::coercion(raw, ty)),
        },
        DomainType::Boolean => Ok(Value::Boolean(match raw {
            JsonValue::Bool(b) => *b,
            JsonValue::String(s) => is_truthy(s),
            JsonValue::Number(n) => !json_number(n).is_zero(),
            _ => false,
        })),
        DomainType::Date | DomainType::DateTime | DomainType::TimeOfDay => match raw {
            JsonValue::String(s) => parse_temporal(ty, s).ok_or_else(|| InvalidDataError::coercion(raw, ty)),
            _ => Err(InvalidDataError::coercion(raw, ty)),
        },
    }
}

/// Convert an already-typed value to `ty`
pub fn convert(ty: DomainType, value: Value) -> Result<Value> {
    if value.domain_type() == ty {
        return Ok(value);
    }
    match (ty, value) {
        (DomainType::String, other) => Ok(Value::String(other.to_string())),
        (DomainType::Number, Value::String(s)) => parse_number(&s)
            .map(Value::Number)
            .ok_or_else(|| InvalidDataError::coercion(format!("{s:?}"), ty)),
        (DomainType::Number, Value::Boolean(b)) => Ok(Value::Number(Number::Int(i64::from(b)))),
        (DomainType::Boolean, Value::String(s)) => Ok(Value::Boolean(is_truthy(&s))),
        (DomainType::Boolean, Value::Number(n)) => Ok(Value::Boolean(!n.is_zero())),
        (DomainType::Boolean, _) => Ok(Value::Boolean(false)),
        (DomainType::Date, Value::DateTime(dt)) => Ok(Value::Date(dt.date())),
        (DomainType::DateTime, Value::Date(d)) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
        (DomainType::TimeOfDay, Value::DateTime(dt)) => Ok(Value::TimeOfDay(dt.time())),
        (ty, Value::String(s)) if ty.is_temporal() => {
            parse_temporal(ty, &s).ok_or_else(|| InvalidDataError::coercion(format!("{s:?}"), ty))
        }
        (ty, other) => Err(InvalidDataError::coercion(other, ty)),
    }
}

/// Coerce every element of a list, reporting the whole list on failure
pub fn coerce_list(ty: DomainType, raw: &[JsonValue]) -> Result<Vec<Value>> {
    raw.iter()
        .map(|v| coerce(ty, v))
        .collect::<Result<Vec<_>>>()
        .map_err(|_| InvalidDataError::CollectionCoercion {
            values: JsonValue::Array(raw.to_vec()).to_string(),
            to: ty,
        })
}

/// Coerce every value of a mapping, reporting the whole mapping on failure
pub fn coerce_dict(ty: DomainType, raw: &Map<String, JsonValue>) -> Result<BTreeMap<String, Value>> {
    raw.iter()
        .map(|(k, v)| coerce(ty, v).map(|v| (k.clone(), v)))
        .collect::<Result<BTreeMap<_, _>>>()
        .map_err(|_| InvalidDataError::CollectionCoercion {
            values: JsonValue::Object(raw.clone()).to_string(),
            to: ty,
        })
}

/// Render a value for the wire or for a filter specification.
///
/// String, Number and Boolean pass through unchanged; temporal values become
/// ISO-8601 strings that [`coerce`] parses back to the same value.
pub fn to_output_string(value: &Value) -> JsonValue {
    value.to_json()
}

/// Coerce one raw row against the column types of a schema
pub fn coerce_row(types: &[DomainType], raw: &[JsonValue]) -> Result<Row> {
    if raw.len() != types.len() {
        return Err(InvalidDataError::RowLength {
            row: 0,
            expected: types.len(),
            found: raw.len(),
        });
    }
    types.iter().zip(raw).map(|(ty, v)| coerce(*ty, v)).collect()
}

/// Coerce a list of raw rows, each of which must be a JSON list
pub fn coerce_rows(types: &[DomainType], raw: &[JsonValue]) -> Result<Vec<Row>> {
    raw.iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row.as_array().ok_or_else(|| InvalidDataError::NotAList {
                operator: "rows",
                field: "row",
                found: row.to_string(),
            })?;
            coerce_row(types, cells).map_err(|err| match err {
                InvalidDataError::RowLength { expected, found, .. } => {
                    InvalidDataError::RowLength { row: i, expected, found }
                }
                other => other,
            })
        })
        .collect()
}

/// Render rows for the wire
pub fn jsonifiable_rows(rows: &[Row]) -> Vec<Vec<JsonValue>> {
    rows.iter()
        .map(|row| row.iter().map(to_output_string).collect())
        .collect()
}

// =============================================================================
// Lenient ingestion conversion
// =============================================================================

/// Per-column conversion used when bulk-loading cells.
///
/// Never fails: a cell that cannot be read as `column_type` becomes the
/// column default. `format_string` is a strftime-style pattern tried before
/// ISO-8601 for temporal columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConversion {
    #[serde(rename = "type")]
    pub column_type: DomainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

impl ColumnConversion {
    pub fn new(column_type: DomainType) -> Self {
        Self {
            column_type,
            format_string: None,
            default_value: None,
        }
    }

    pub fn with_format(mut self, format_string: impl Into<String>) -> Self {
        self.format_string = Some(format_string.into());
        self
    }

    pub fn with_default(mut self, default_value: JsonValue) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Default for unreadable cells. A configured default is itself coerced
    /// to the column type; if that fails the built-in default is used.
    pub fn default_for_column(&self) -> Value {
        self.default_value
            .as_ref()
            .and_then(|raw| self.parse_cell(raw))
            .unwrap_or_else(|| builtin_default(self.column_type))
    }

    pub fn convert(&self, cell: &JsonValue) -> Value {
        self.parse_cell(cell)
            .unwrap_or_else(|| self.default_for_column())
    }

    pub fn convert_column(&self, cells: &[JsonValue]) -> Vec<Value> {
        cells.iter().map(|c| self.convert(c)).collect()
    }

    fn parse_cell(&self, cell: &JsonValue) -> Option<Value> {
        match self.column_type {
            DomainType::String | DomainType::Boolean => coerce(self.column_type, cell).ok(),
            DomainType::Number => match cell {
                JsonValue::Number(n) => Some(Value::Number(json_number(n))),
                JsonValue::String(s) => parse_decimal(s).map(Value::Number),
                _ => None,
            },
            ty => {
                let s = cell.as_str()?.trim();
                self.format_string
                    .as_deref()
                    .and_then(|fmt| parse_with_format(ty, s, fmt))
                    .or_else(|| parse_temporal_lenient(ty, s))
            }
        }
    }
}

/// Convert one raw row with a conversion per column. Extra cells are dropped
/// and missing cells take the column default.
pub fn convert_row(conversions: &[ColumnConversion], raw: &[JsonValue]) -> Row {
    conversions
        .iter()
        .enumerate()
        .map(|(i, conv)| match raw.get(i) {
            Some(cell) => conv.convert(cell),
            None => conv.default_for_column(),
        })
        .collect()
}

fn builtin_default(ty: DomainType) -> Value {
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    match ty {
        DomainType::String => Value::String(String::new()),
        DomainType::Number => Value::Number(Number::Float(f64::NAN)),
        DomainType::Boolean => Value::Boolean(false),
        DomainType::Date => Value::Date(epoch),
        DomainType::DateTime => Value::DateTime(epoch.and_time(NaiveTime::MIN)),
        DomainType::TimeOfDay => Value::TimeOfDay(NaiveTime::MIN),
    }
}

// =============================================================================
// Parsers
// =============================================================================

fn is_truthy(s: &str) -> bool {
    let s = s.trim();
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(s))
}

fn json_number(n: &serde_json::Number) -> Number {
    match n.as_i64() {
        Some(i) => Number::Int(i),
        None => Number::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Decimal float, then decimal int
fn parse_decimal(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(f) = s.parse::<f64>() {
        return Some(Number::Float(f));
    }
    s.parse::<i64>().ok().map(Number::Int)
}

/// Decimal float, then decimal int, then binary, octal and hex ints
pub(crate) fn parse_number(s: &str) -> Option<Number> {
    parse_decimal(s).or_else(|| {
        [(2, "0b"), (8, "0o"), (16, "0x")]
            .into_iter()
            .find_map(|(radix, prefix)| parse_radix(s.trim(), radix, prefix))
            .map(Number::Int)
    })
}

fn parse_radix(s: &str, radix: u32, prefix: &str) -> Option<i64> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits = match unsigned.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &unsigned[prefix.len()..],
        _ => unsigned,
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_temporal(ty: DomainType, s: &str) -> Option<Value> {
    match ty {
        DomainType::Date => parse_date(s).map(Value::Date),
        DomainType::DateTime => parse_datetime(s).map(Value::DateTime),
        DomainType::TimeOfDay => parse_time(s).map(Value::TimeOfDay),
        _ => None,
    }
}

/// Like [`parse_temporal`], but a Date or TimeOfDay cell may also hold a full
/// datetime and is truncated
fn parse_temporal_lenient(ty: DomainType, s: &str) -> Option<Value> {
    parse_temporal(ty, s).or_else(|| {
        let dt = parse_datetime(s)?;
        match ty {
            DomainType::Date => Some(Value::Date(dt.date())),
            DomainType::TimeOfDay if s.contains(['T', ' ']) => Some(Value::TimeOfDay(dt.time())),
            _ => None,
        }
    })
}

fn parse_with_format(ty: DomainType, s: &str, fmt: &str) -> Option<Value> {
    match ty {
        DomainType::Date => NaiveDate::parse_from_str(s, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
            .map(Value::Date),
        DomainType::DateTime => NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, fmt)
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map(Value::DateTime),
        DomainType::TimeOfDay => NaiveTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.time()))
            .map(Value::TimeOfDay),
        _ => None,
    }
}

/// ISO-8601 date
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// ISO-8601 datetime with `T` or space separator. Explicit offsets are
/// normalized to UTC; a bare date is midnight.
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = OFFSET_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// ISO-8601 time
pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}
