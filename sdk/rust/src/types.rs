//! Scalar domain types, typed values and table schemas

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{InvalidDataError, Result};

// =============================================================================
// Domain types
// =============================================================================

/// The scalar type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    TimeOfDay,
}

impl DomainType {
    pub const ALL: [DomainType; 6] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Date,
        Self::DateTime,
        Self::TimeOfDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::TimeOfDay => "timeofday",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::TimeOfDay)
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DomainType {
    type Err = InvalidDataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| InvalidDataError::InvalidSchema {
            found: s.to_string(),
            reason: format!(
                "type must be one of {}",
                Self::ALL.map(|t| t.as_str()).join(", ")
            ),
        })
    }
}

// =============================================================================
// Numbers
// =============================================================================

/// A numeric value. Integers and floats compare numerically with each other.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    /// `self - other`, staying integral when both sides are
    pub fn difference(self, other: Number) -> Number {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => match a.checked_sub(b) {
                Some(d) => Self::Int(d),
                None => Self::Float(a as f64 - b as f64),
            },
            (a, b) => Self::Float(a.as_f64() - b.as_f64()),
        }
    }

    pub fn to_json(self) -> JsonValue {
        match self {
            Self::Int(i) => JsonValue::from(i),
            // NaN and infinities have no JSON form and become null
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (*self, *other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            (Self::Float(a), Self::Float(b)) => cmp_floats(a, b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(a, b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(b, a).reverse(),
        }
    }
}

/// Numeric order with `-0.0 == 0.0`; NaN sorts above or below every number by sign
fn cmp_floats(a: f64, b: f64) -> Ordering {
    if a == b {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

/// Exact comparison; `i as f64` would round integers beyond 2^53
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, exactly representable
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }

    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        Ordering::Equal if f < whole => Ordering::Greater,
        ordering => ordering,
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

// =============================================================================
// Values
// =============================================================================

/// A typed scalar held by a table cell, a filter literal or a range bound.
///
/// Values of the same variant order naturally. Values of different variants
/// order by variant, which only matters for sets that mix types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    String(String),
    Number(Number),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimeOfDay(NaiveTime),
}

impl Value {
    pub fn domain_type(&self) -> DomainType {
        match self {
            Self::String(_) => DomainType::String,
            Self::Number(_) => DomainType::Number,
            Self::Boolean(_) => DomainType::Boolean,
            Self::Date(_) => DomainType::Date,
            Self::DateTime(_) => DomainType::DateTime,
            Self::TimeOfDay(_) => DomainType::TimeOfDay,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Wire form: numbers stay numbers, temporal values become ISO-8601 strings
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Number(n) => n.to_json(),
            Self::Boolean(b) => JsonValue::Bool(*b),
            Self::Date(_) | Self::DateTime(_) | Self::TimeOfDay(_) => {
                JsonValue::String(self.to_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::TimeOfDay(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Number(Number::Int(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Number(Number::Float(f))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Self::TimeOfDay(t)
    }
}

/// One table row, in schema order
pub type Row = Vec<Value>;

// =============================================================================
// Schema
// =============================================================================

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: DomainType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: DomainType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered column descriptors of a table. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Validate a JSON list of `{"name", "type"}` objects
    pub fn from_json(raw: &JsonValue) -> Result<Self> {
        let Some(entries) = raw.as_array() else {
            return Err(InvalidDataError::InvalidSchema {
                found: raw.to_string(),
                reason: "schema must be a list of {name, type} objects".to_string(),
            });
        };

        let mut columns = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.get("name").and_then(JsonValue::as_str);
            let type_name = entry.get("type").and_then(JsonValue::as_str);
            let (Some(name), Some(type_name)) = (name, type_name) else {
                return Err(InvalidDataError::InvalidSchema {
                    found: entry.to_string(),
                    reason: "each column needs a string name and a string type".to_string(),
                });
            };
            let column_type = DomainType::parse(type_name).ok_or_else(|| {
                InvalidDataError::InvalidSchema {
                    found: entry.to_string(),
                    reason: format!(
                        "type must be one of {}",
                        DomainType::ALL.map(|t| t.as_str()).join(", ")
                    ),
                }
            })?;
            columns.push(Column::new(name, column_type));
        }
        Ok(Self { columns })
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(
            self.columns
                .iter()
                .map(|c| serde_json::json!({ "name": c.name, "type": c.column_type }))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn types(&self) -> Vec<DomainType> {
        self.columns.iter().map(|c| c.column_type).collect()
    }

    /// Index of the first column with this name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<DomainType> {
        self.column(name).map(|c| c.column_type)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Self::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
