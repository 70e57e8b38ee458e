//! Filter specifications: the JSON filter grammar as a typed tree
//!
//! ```text
//! {"operator": "ALL"|"ANY"|"NONE", "arguments": [FilterSpec, ...]}
//! {"operator": "IN_LIST", "column": <string>, "values": [<scalar>, ...]}
//! {"operator": "IN_RANGE", "column": <string>, "min_val": <scalar>, "max_val": <scalar>}
//! {"operator": "REGEX_MATCH", "column": <string>, "expression": <string>}
//! ```
//!
//! Parsing runs the structural checks first (object, operator, required
//! fields, field shapes) and the semantic checks last (comparable range
//! bounds, compilable regular expressions).

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue, json};

use crate::error::{InvalidDataError, Result};

// =============================================================================
// Operators
// =============================================================================

/// The six operator names of the filter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    All,
    Any,
    None,
    InList,
    InRange,
    RegexMatch,
}

impl FilterOperator {
    pub const ALL_OPERATORS: [FilterOperator; 6] = [
        Self::All,
        Self::Any,
        Self::None,
        Self::InList,
        Self::InRange,
        Self::RegexMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Any => "ANY",
            Self::None => "NONE",
            Self::InList => "IN_LIST",
            Self::InRange => "IN_RANGE",
            Self::RegexMatch => "REGEX_MATCH",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL_OPERATORS.into_iter().find(|op| op.as_str() == name)
    }

    /// Fields every node with this operator must carry, sorted
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::All | Self::Any | Self::None => &["arguments"],
            Self::InList => &["column", "values"],
            Self::InRange => &["column", "max_val", "min_val"],
            Self::RegexMatch => &["column", "expression"],
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::All | Self::Any | Self::None)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boolean combinators for compound nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundOperator {
    All,
    Any,
    None,
}

impl CompoundOperator {
    pub fn operator(&self) -> FilterOperator {
        match self {
            Self::All => FilterOperator::All,
            Self::Any => FilterOperator::Any,
            Self::None => FilterOperator::None,
        }
    }
}

// =============================================================================
// Filter specification tree
// =============================================================================

/// A validated filter specification. Literals stay raw JSON until the
/// specification is compiled against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Compound {
        operator: CompoundOperator,
        arguments: Vec<FilterSpec>,
    },
    InList {
        column: String,
        values: Vec<JsonValue>,
    },
    InRange {
        column: String,
        min_val: JsonValue,
        max_val: JsonValue,
    },
    RegexMatch {
        column: String,
        expression: String,
    },
}

impl FilterSpec {
    pub fn all(arguments: Vec<FilterSpec>) -> Self {
        Self::Compound {
            operator: CompoundOperator::All,
            arguments,
        }
    }

    pub fn any(arguments: Vec<FilterSpec>) -> Self {
        Self::Compound {
            operator: CompoundOperator::Any,
            arguments,
        }
    }

    pub fn none(arguments: Vec<FilterSpec>) -> Self {
        Self::Compound {
            operator: CompoundOperator::None,
            arguments,
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<JsonValue>) -> Self {
        Self::InList {
            column: column.into(),
            values,
        }
    }

    pub fn in_range(column: impl Into<String>, min_val: JsonValue, max_val: JsonValue) -> Self {
        Self::InRange {
            column: column.into(),
            min_val,
            max_val,
        }
    }

    pub fn regex_match(column: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::RegexMatch {
            column: column.into(),
            expression: expression.into(),
        }
    }

    pub fn operator(&self) -> FilterOperator {
        match self {
            Self::Compound { operator, .. } => operator.operator(),
            Self::InList { .. } => FilterOperator::InList,
            Self::InRange { .. } => FilterOperator::InRange,
            Self::RegexMatch { .. } => FilterOperator::RegexMatch,
        }
    }

    /// Parse and validate a raw JSON filter specification
    pub fn parse(raw: &JsonValue) -> Result<Self> {
        let spec = parse_node(raw)?;
        spec.check()?;
        Ok(spec)
    }

    /// Semantic checks over the whole tree: range bounds must be comparable
    /// scalars and regular expressions must compile. Specifications built
    /// with the constructors above skip [`FilterSpec::parse`], so compilation
    /// runs this again.
    pub fn check(&self) -> Result<()> {
        match self {
            Self::Compound { arguments, .. } => arguments.iter().try_for_each(Self::check),
            Self::InList { .. } => Ok(()),
            Self::InRange {
                min_val, max_val, ..
            } => check_range_bounds(min_val, max_val),
            Self::RegexMatch { expression, .. } => Regex::new(expression)
                .map(|_| ())
                .map_err(|e| InvalidDataError::InvalidRegex {
                    expression: expression.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// The wire form of this specification
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Compound {
                operator,
                arguments,
            } => json!({
                "operator": operator.operator().as_str(),
                "arguments": arguments.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            Self::InList { column, values } => json!({
                "operator": "IN_LIST",
                "column": column,
                "values": values,
            }),
            Self::InRange {
                column,
                min_val,
                max_val,
            } => json!({
                "operator": "IN_RANGE",
                "column": column,
                "min_val": min_val,
                "max_val": max_val,
            }),
            Self::RegexMatch { column, expression } => json!({
                "operator": "REGEX_MATCH",
                "column": column,
                "expression": expression,
            }),
        }
    }
}

/// Validate a raw filter specification without keeping the parsed tree
pub fn validate(raw: &JsonValue) -> Result<()> {
    FilterSpec::parse(raw).map(|_| ())
}

impl TryFrom<JsonValue> for FilterSpec {
    type Error = InvalidDataError;

    fn try_from(raw: JsonValue) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl TryFrom<&JsonValue> for FilterSpec {
    type Error = InvalidDataError;

    fn try_from(raw: &JsonValue) -> Result<Self> {
        Self::parse(raw)
    }
}

impl Serialize for FilterSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Structural parsing
// =============================================================================

fn parse_node(raw: &JsonValue) -> Result<FilterSpec> {
    let Some(obj) = raw.as_object() else {
        return Err(InvalidDataError::SpecNotObject {
            found: raw.to_string(),
        });
    };
    let Some(op_value) = obj.get("operator") else {
        return Err(InvalidDataError::MissingOperator {
            spec: raw.to_string(),
        });
    };
    let Some(op_name) = op_value.as_str() else {
        return Err(InvalidDataError::OperatorNotString {
            operator: op_value.to_string(),
        });
    };
    let Some(operator) = FilterOperator::parse(op_name) else {
        return Err(InvalidDataError::UnknownOperator {
            operator: op_name.to_string(),
            valid: FilterOperator::ALL_OPERATORS
                .map(|op| op.as_str())
                .join(", "),
        });
    };

    let missing: Vec<&'static str> = operator
        .required_fields()
        .iter()
        .copied()
        .filter(|field| !obj.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(InvalidDataError::MissingFields {
            operator: operator.as_str(),
            spec: raw.to_string(),
            fields: missing,
        });
    }

    match operator {
        FilterOperator::All | FilterOperator::Any | FilterOperator::None => {
            let arguments = list_field(obj, operator, "arguments")?
                .iter()
                .map(parse_node)
                .collect::<Result<Vec<_>>>()?;
            let operator = match operator {
                FilterOperator::All => CompoundOperator::All,
                FilterOperator::Any => CompoundOperator::Any,
                _ => CompoundOperator::None,
            };
            Ok(FilterSpec::Compound {
                operator,
                arguments,
            })
        }
        FilterOperator::InList => Ok(FilterSpec::InList {
            column: string_field(obj, operator, "column")?,
            values: list_field(obj, operator, "values")?.to_vec(),
        }),
        FilterOperator::InRange => {
            let column = string_field(obj, operator, "column")?;
            let min_val = scalar_bound(obj, "min_val")?;
            let max_val = scalar_bound(obj, "max_val")?;
            Ok(FilterSpec::InRange {
                column,
                min_val,
                max_val,
            })
        }
        FilterOperator::RegexMatch => Ok(FilterSpec::RegexMatch {
            column: string_field(obj, operator, "column")?,
            expression: string_field(obj, operator, "expression")?,
        }),
    }
}

fn list_field<'a>(
    obj: &'a Map<String, JsonValue>,
    operator: FilterOperator,
    field: &'static str,
) -> Result<&'a Vec<JsonValue>> {
    let value = &obj[field];
    value.as_array().ok_or_else(|| InvalidDataError::NotAList {
        operator: operator.as_str(),
        field,
        found: value.to_string(),
    })
}

fn string_field(
    obj: &Map<String, JsonValue>,
    operator: FilterOperator,
    field: &'static str,
) -> Result<String> {
    let value = &obj[field];
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| InvalidDataError::NotAString {
            operator: operator.as_str(),
            field,
            found: value.to_string(),
        })
}

fn scalar_bound(obj: &Map<String, JsonValue>, field: &'static str) -> Result<JsonValue> {
    let value = &obj[field];
    match value {
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => Ok(value.clone()),
        _ => Err(InvalidDataError::RangeBoundNotScalar {
            field,
            found: value.to_string(),
        }),
    }
}

/// Strings compare with strings; numbers and booleans compare with each other
fn check_range_bounds(min_val: &JsonValue, max_val: &JsonValue) -> Result<()> {
    let numeric = |v: &JsonValue| matches!(v, JsonValue::Number(_) | JsonValue::Bool(_));
    let comparable = match (min_val, max_val) {
        (JsonValue::String(_), JsonValue::String(_)) => true,
        (a, b) => numeric(a) && numeric(b),
    };
    if comparable {
        Ok(())
    } else {
        Err(InvalidDataError::IncomparableRange {
            min_val: min_val.to_string(),
            max_val: max_val.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(raw: JsonValue) -> InvalidDataError {
        FilterSpec::parse(&raw).unwrap_err()
    }

    #[test]
    fn test_parse_primitives() {
        let spec = FilterSpec::parse(&json!({
            "operator": "IN_LIST", "column": "name", "values": ["Ted", "Alice"]
        }))
        .unwrap();
        assert_eq!(spec, FilterSpec::in_list("name", vec![json!("Ted"), json!("Alice")]));

        let spec = FilterSpec::parse(&json!({
            "operator": "IN_RANGE", "column": "age", "min_val": 21, "max_val": 24
        }))
        .unwrap();
        assert_eq!(spec.operator(), FilterOperator::InRange);

        let spec = FilterSpec::parse(&json!({
            "operator": "REGEX_MATCH", "column": "name", "expression": "T.*"
        }))
        .unwrap();
        assert_eq!(spec, FilterSpec::regex_match("name", "T.*"));
    }

    #[test]
    fn test_parse_nested_compound() {
        let raw = json!({
            "operator": "ALL",
            "arguments": [
                {"operator": "NONE", "arguments": [
                    {"operator": "IN_LIST", "column": "name", "values": ["Ted"]}
                ]},
                {"operator": "ANY", "arguments": []}
            ]
        });
        let spec = FilterSpec::parse(&raw).unwrap();
        let FilterSpec::Compound { operator, arguments } = &spec else {
            panic!("expected compound");
        };
        assert_eq!(*operator, CompoundOperator::All);
        assert_eq!(arguments.len(), 2);
        assert_eq!(spec.to_json(), raw);
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(parse_err(json!([1, 2])), InvalidDataError::SpecNotObject { .. }));
        assert!(matches!(
            parse_err(json!({"column": "a"})),
            InvalidDataError::MissingOperator { .. }
        ));
        assert!(matches!(
            parse_err(json!({"operator": 3})),
            InvalidDataError::OperatorNotString { .. }
        ));
        let err = parse_err(json!({"operator": "BETWEEN"}));
        assert_eq!(
            err.to_string(),
            "BETWEEN is not a valid operator. Valid operators are ALL, ANY, NONE, IN_LIST, IN_RANGE, REGEX_MATCH"
        );
    }

    #[test]
    fn test_missing_fields_are_sorted() {
        let err = parse_err(json!({"operator": "IN_RANGE"}));
        let InvalidDataError::MissingFields { operator, fields, .. } = err else {
            panic!("expected missing fields");
        };
        assert_eq!(operator, "IN_RANGE");
        assert_eq!(fields, vec!["column", "max_val", "min_val"]);
    }

    #[test]
    fn test_list_fields_must_be_lists() {
        assert!(matches!(
            parse_err(json!({"operator": "ANY", "arguments": {"operator": "ALL"}})),
            InvalidDataError::NotAList { field: "arguments", .. }
        ));
        assert!(matches!(
            parse_err(json!({"operator": "IN_LIST", "column": "a", "values": "Ted"})),
            InvalidDataError::NotAList { field: "values", .. }
        ));
    }

    #[test]
    fn test_nested_errors_surface() {
        let err = parse_err(json!({
            "operator": "ALL",
            "arguments": [{"operator": "IN_LIST", "column": "a"}]
        }));
        assert!(matches!(err, InvalidDataError::MissingFields { operator: "IN_LIST", .. }));
    }

    #[test]
    fn test_range_bounds_structural_before_comparability() {
        // A list bound is rejected as non-scalar, not as incomparable
        assert!(matches!(
            parse_err(json!({"operator": "IN_RANGE", "column": "a", "min_val": [1], "max_val": "z"})),
            InvalidDataError::RangeBoundNotScalar { field: "min_val", .. }
        ));
        assert!(matches!(
            parse_err(json!({"operator": "IN_RANGE", "column": "a", "min_val": 1, "max_val": "z"})),
            InvalidDataError::IncomparableRange { .. }
        ));
        assert!(FilterSpec::parse(&json!({
            "operator": "IN_RANGE", "column": "a", "min_val": true, "max_val": 3.5
        }))
        .is_ok());
    }

    #[test]
    fn test_invalid_regex() {
        let err = parse_err(json!({"operator": "REGEX_MATCH", "column": "a", "expression": "(unclosed"}));
        assert!(matches!(err, InvalidDataError::InvalidRegex { .. }));
        assert!(matches!(
            parse_err(json!({"operator": "REGEX_MATCH", "column": "a", "expression": 5})),
            InvalidDataError::NotAString { field: "expression", .. }
        ));
    }

    #[test]
    fn test_check_catches_constructed_specs() {
        let spec = FilterSpec::any(vec![FilterSpec::in_range("a", json!("x"), json!(1))]);
        assert!(spec.check().is_err());
        assert!(FilterSpec::regex_match("a", "[").check().is_err());
    }

    #[test]
    fn test_serde_uses_wire_grammar() {
        let spec: FilterSpec = serde_json::from_value(json!({
            "operator": "IN_RANGE", "column": "age", "min_val": 20, "max_val": 30
        }))
        .unwrap();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"operator": "IN_RANGE", "column": "age", "min_val": 20, "max_val": 30})
        );
        assert!(serde_json::from_value::<FilterSpec>(json!({"operator": "NOPE"})).is_err());
        assert!(validate(&json!({"operator": "ALL", "arguments": []})).is_ok());
    }

    #[test]
    fn test_required_fields_table() {
        for op in FilterOperator::ALL_OPERATORS {
            let fields = op.required_fields();
            let mut sorted = fields.to_vec();
            sorted.sort();
            assert_eq!(fields, sorted.as_slice());
            assert_eq!(op.is_compound(), fields == ["arguments"]);
        }
    }
}
