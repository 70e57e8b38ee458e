//! Compiled filters: a [`FilterSpec`] bound to a schema and ready to run

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::Value as JsonValue;

use super::spec::{CompoundOperator, FilterSpec};
use crate::convert::{coerce, coerce_list, to_output_string};
use crate::error::{InvalidDataError, Result};
use crate::types::{DomainType, Number, Row, Schema, Value};

/// A column resolved against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: String,
    pub index: usize,
    pub column_type: DomainType,
}

impl ColumnBinding {
    fn resolve(schema: &Schema, name: &str) -> Result<Self> {
        let index = schema
            .index_of(name)
            .ok_or_else(|| InvalidDataError::unknown_column(name))?;
        Ok(Self {
            name: name.to_string(),
            index,
            column_type: schema.columns()[index].column_type,
        })
    }

    fn value<'r>(&self, row: &'r Row) -> Option<&'r Value> {
        row.get(self.index)
    }
}

/// A filter whose columns are resolved to indices and whose literals are
/// coerced to the column types. Immutable and reusable across row sets.
#[derive(Debug, Clone)]
pub enum DataPlaneFilter {
    Compound {
        operator: CompoundOperator,
        arguments: Vec<DataPlaneFilter>,
    },
    InList {
        column: ColumnBinding,
        values: Vec<Value>,
    },
    InRange {
        column: ColumnBinding,
        min_val: Value,
        max_val: Value,
    },
    RegexMatch {
        column: ColumnBinding,
        expression: String,
        regex: Regex,
    },
}

impl DataPlaneFilter {
    /// Compile `spec` against `schema`
    pub fn new(spec: &FilterSpec, schema: &Schema) -> Result<Self> {
        spec.check()?;
        Self::compile(spec, schema)
    }

    /// Parse, validate and compile a raw JSON filter specification
    pub fn from_json(raw: &JsonValue, schema: &Schema) -> Result<Self> {
        let spec = FilterSpec::parse(raw)?;
        Self::compile(&spec, schema)
    }

    fn compile(spec: &FilterSpec, schema: &Schema) -> Result<Self> {
        match spec {
            FilterSpec::Compound {
                operator,
                arguments,
            } => Ok(Self::Compound {
                operator: *operator,
                arguments: arguments
                    .iter()
                    .map(|arg| Self::compile(arg, schema))
                    .collect::<Result<Vec<_>>>()?,
            }),
            FilterSpec::InList { column, values } => {
                let column = ColumnBinding::resolve(schema, column)?;
                let values = coerce_list(column.column_type, values)?;
                Ok(Self::InList { column, values })
            }
            FilterSpec::InRange {
                column,
                min_val,
                max_val,
            } => {
                let column = ColumnBinding::resolve(schema, column)?;
                let min_val = coerce(column.column_type, min_val)?;
                let max_val = coerce(column.column_type, max_val)?;
                let (min_val, max_val) = if min_val > max_val {
                    (max_val, min_val)
                } else {
                    (min_val, max_val)
                };
                Ok(Self::InRange {
                    column,
                    min_val,
                    max_val,
                })
            }
            FilterSpec::RegexMatch { column, expression } => {
                let column = ColumnBinding::resolve(schema, column)?;
                if column.column_type != DomainType::String {
                    return Err(InvalidDataError::RegexColumnType {
                        column: column.name,
                        found: column.column_type,
                    });
                }
                // Full-string match semantics
                let regex = Regex::new(&format!("^(?:{expression})$")).map_err(|e| {
                    InvalidDataError::InvalidRegex {
                        expression: expression.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Self::RegexMatch {
                    column,
                    expression: expression.clone(),
                    regex,
                })
            }
        }
    }

    /// Indices of the rows this filter accepts
    pub fn filter_index(&self, rows: &[Row]) -> BTreeSet<usize> {
        match self {
            Self::Compound {
                operator,
                arguments,
            } => {
                let universe = || (0..rows.len()).collect::<BTreeSet<usize>>();
                match operator {
                    CompoundOperator::All => arguments.iter().fold(universe(), |acc, arg| {
                        let matched = arg.filter_index(rows);
                        acc.intersection(&matched).copied().collect()
                    }),
                    CompoundOperator::Any => {
                        arguments.iter().fold(BTreeSet::new(), |mut acc, arg| {
                            acc.extend(arg.filter_index(rows));
                            acc
                        })
                    }
                    CompoundOperator::None => arguments.iter().fold(universe(), |acc, arg| {
                        let matched = arg.filter_index(rows);
                        acc.difference(&matched).copied().collect()
                    }),
                }
            }
            Self::InList { column, values } => matching(rows, |row| {
                column.value(row).is_some_and(|v| values.contains(v))
            }),
            Self::InRange {
                column,
                min_val,
                max_val,
            } => matching(rows, |row| {
                column
                    .value(row)
                    .is_some_and(|v| min_val <= v && v <= max_val)
            }),
            Self::RegexMatch { column, regex, .. } => matching(rows, |row| {
                column
                    .value(row)
                    .and_then(Value::as_str)
                    .is_some_and(|s| regex.is_match(s))
            }),
        }
    }

    /// The accepted rows, in their original order
    pub fn filter(&self, rows: Vec<Row>) -> Vec<Row> {
        let keep = self.filter_index(&rows);
        rows.into_iter()
            .enumerate()
            .filter_map(|(i, row)| keep.contains(&i).then_some(row))
            .collect()
    }

    /// Back to a filter specification. Compiling the result against the same
    /// schema gives a filter that accepts the same rows.
    pub fn to_spec(&self) -> FilterSpec {
        match self {
            Self::Compound {
                operator,
                arguments,
            } => FilterSpec::Compound {
                operator: *operator,
                arguments: arguments.iter().map(Self::to_spec).collect(),
            },
            Self::InList { column, values } => FilterSpec::InList {
                column: column.name.clone(),
                values: values.iter().map(spec_literal).collect(),
            },
            Self::InRange {
                column,
                min_val,
                max_val,
            } => FilterSpec::InRange {
                column: column.name.clone(),
                min_val: spec_literal(min_val),
                max_val: spec_literal(max_val),
            },
            Self::RegexMatch {
                column, expression, ..
            } => FilterSpec::RegexMatch {
                column: column.name.clone(),
                expression: expression.clone(),
            },
        }
    }

    /// Every literal, bound or regex source used against `column` anywhere in
    /// this tree
    pub fn collect_column_values(&self, column: &str) -> BTreeSet<Value> {
        match self {
            Self::Compound { arguments, .. } => arguments
                .iter()
                .flat_map(|arg| arg.collect_column_values(column))
                .collect(),
            Self::InList { column: c, values } if c.name == column => {
                values.iter().cloned().collect()
            }
            Self::InRange {
                column: c,
                min_val,
                max_val,
            } if c.name == column => BTreeSet::from([min_val.clone(), max_val.clone()]),
            Self::RegexMatch {
                column: c,
                expression,
                ..
            } if c.name == column => BTreeSet::from([Value::String(expression.clone())]),
            _ => BTreeSet::new(),
        }
    }

    /// Names of every column this tree references
    pub fn column_names(&self) -> BTreeSet<&str> {
        match self {
            Self::Compound { arguments, .. } => {
                arguments.iter().flat_map(Self::column_names).collect()
            }
            Self::InList { column, .. }
            | Self::InRange { column, .. }
            | Self::RegexMatch { column, .. } => BTreeSet::from([column.name.as_str()]),
        }
    }
}

fn matching(rows: &[Row], accept: impl Fn(&Row) -> bool) -> BTreeSet<usize> {
    rows.iter()
        .enumerate()
        .filter_map(|(i, row)| accept(row).then_some(i))
        .collect()
}

/// A literal as written back into a spec. Non-finite floats have no JSON
/// number form, so they go out as the strings `coerce` reads them from.
fn spec_literal(value: &Value) -> JsonValue {
    match value {
        Value::Number(Number::Float(f)) if !f.is_finite() => JsonValue::String(f.to_string()),
        other => to_output_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Number};
    use chrono::NaiveDate;
    use serde_json::json;

    fn people_schema() -> Schema {
        Schema::new(vec![
            Column::new("name", DomainType::String),
            Column::new("age", DomainType::Number),
        ])
    }

    fn people() -> Vec<Row> {
        vec![
            vec![Value::from("Ted"), Value::from(21i64)],
            vec![Value::from("Alice"), Value::from(24i64)],
            vec![Value::from("Jane"), Value::from(20i64)],
        ]
    }

    fn indices(filter: &DataPlaneFilter, rows: &[Row]) -> Vec<usize> {
        filter.filter_index(rows).into_iter().collect()
    }

    fn compile(raw: JsonValue) -> DataPlaneFilter {
        DataPlaneFilter::from_json(&raw, &people_schema()).unwrap()
    }

    #[test]
    fn test_in_range_inclusive() {
        let schema = Schema::new(vec![Column::new("age", DomainType::Number)]);
        let rows = vec![
            vec![Value::from(21i64)],
            vec![Value::from(24i64)],
            vec![Value::from(20i64)],
        ];
        let filter = DataPlaneFilter::from_json(
            &json!({"operator": "IN_RANGE", "column": "age", "min_val": 21, "max_val": 24}),
            &schema,
        )
        .unwrap();
        assert_eq!(indices(&filter, &rows), vec![0, 1]);
    }

    #[test]
    fn test_in_range_swapped_bounds() {
        let filter = compile(json!({"operator": "IN_RANGE", "column": "age", "min_val": 24, "max_val": 21}));
        assert_eq!(indices(&filter, &people()), vec![0, 1]);
        let DataPlaneFilter::InRange { min_val, max_val, .. } = &filter else {
            panic!("expected IN_RANGE");
        };
        assert_eq!(*min_val, Value::Number(Number::Int(21)));
        assert_eq!(*max_val, Value::Number(Number::Int(24)));
    }

    #[test]
    fn test_in_list() {
        let filter = compile(json!({"operator": "IN_LIST", "column": "name", "values": ["Ted", "Alice"]}));
        assert_eq!(indices(&filter, &people()), vec![0, 1]);
    }

    #[test]
    fn test_in_list_coerces_values() {
        let filter = compile(json!({"operator": "IN_LIST", "column": "age", "values": ["20", 24]}));
        assert_eq!(indices(&filter, &people()), vec![1, 2]);
    }

    #[test]
    fn test_none_complements() {
        let filter = compile(json!({
            "operator": "NONE",
            "arguments": [{"operator": "IN_LIST", "column": "name", "values": ["Ted"]}]
        }));
        assert_eq!(indices(&filter, &people()), vec![1, 2]);
    }

    #[test]
    fn test_empty_compounds() {
        let rows = people();
        assert_eq!(indices(&compile(json!({"operator": "ALL", "arguments": []})), &rows), vec![0, 1, 2]);
        assert!(indices(&compile(json!({"operator": "ANY", "arguments": []})), &rows).is_empty());
        assert_eq!(indices(&compile(json!({"operator": "NONE", "arguments": []})), &rows), vec![0, 1, 2]);
    }

    #[test]
    fn test_all_and_any() {
        let ted_or_young = compile(json!({
            "operator": "ANY",
            "arguments": [
                {"operator": "IN_LIST", "column": "name", "values": ["Ted"]},
                {"operator": "IN_RANGE", "column": "age", "min_val": 0, "max_val": 20}
            ]
        }));
        assert_eq!(indices(&ted_or_young, &people()), vec![0, 2]);

        let ted_and_young = compile(json!({
            "operator": "ALL",
            "arguments": [
                {"operator": "IN_LIST", "column": "name", "values": ["Ted"]},
                {"operator": "IN_RANGE", "column": "age", "min_val": 0, "max_val": 20}
            ]
        }));
        assert!(indices(&ted_and_young, &people()).is_empty());
    }

    #[test]
    fn test_regex_full_match() {
        let schema = Schema::new(vec![Column::new("word", DomainType::String)]);
        let rows = vec![vec![Value::from("foo")], vec![Value::from("foobar")]];
        let filter = DataPlaneFilter::from_json(
            &json!({"operator": "REGEX_MATCH", "column": "word", "expression": "foo"}),
            &schema,
        )
        .unwrap();
        assert_eq!(indices(&filter, &rows), vec![0]);

        let alternation = DataPlaneFilter::from_json(
            &json!({"operator": "REGEX_MATCH", "column": "word", "expression": "bar|foo.*"}),
            &schema,
        )
        .unwrap();
        assert_eq!(indices(&alternation, &rows), vec![0, 1]);
    }

    #[test]
    fn test_regex_requires_string_column() {
        let err = DataPlaneFilter::from_json(
            &json!({"operator": "REGEX_MATCH", "column": "age", "expression": "2.*"}),
            &people_schema(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InvalidDataError::RegexColumnType { found: DomainType::Number, .. }
        ));
    }

    #[test]
    fn test_unknown_column() {
        let err = DataPlaneFilter::from_json(
            &json!({"operator": "IN_LIST", "column": "height", "values": []}),
            &people_schema(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "height is not a valid column name");
    }

    #[test]
    fn test_coercion_failure_in_range() {
        let schema = Schema::new(vec![Column::new("day", DomainType::Date)]);
        let err = DataPlaneFilter::from_json(
            &json!({"operator": "IN_RANGE", "column": "day", "min_val": "2024-01-01", "max_val": "soon"}),
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, InvalidDataError::Coercion { to: DomainType::Date, .. }));
    }

    #[test]
    fn test_filter_keeps_order() {
        let filter = compile(json!({"operator": "IN_LIST", "column": "name", "values": ["Jane", "Ted"]}));
        let rows = filter.filter(people());
        assert_eq!(rows[0][0], Value::from("Ted"));
        assert_eq!(rows[1][0], Value::from("Jane"));
    }

    #[test]
    fn test_to_spec_round_trip() {
        let schema = Schema::new(vec![
            Column::new("name", DomainType::String),
            Column::new("day", DomainType::Date),
        ]);
        let day = |d| Value::Date(NaiveDate::from_ymd_opt(2024, 3, d).unwrap());
        let rows = vec![
            vec![Value::from("a"), day(1)],
            vec![Value::from("b"), day(2)],
            vec![Value::from("c"), day(5)],
        ];
        let raw = json!({
            "operator": "ANY",
            "arguments": [
                {"operator": "IN_RANGE", "column": "day", "min_val": "2024-03-02", "max_val": "2024-03-01"},
                {"operator": "NONE", "arguments": [
                    {"operator": "REGEX_MATCH", "column": "name", "expression": "[ab]"}
                ]}
            ]
        });
        let filter = DataPlaneFilter::from_json(&raw, &schema).unwrap();
        let spec = filter.to_spec();
        let recompiled = DataPlaneFilter::new(&spec, &schema).unwrap();
        assert_eq!(recompiled.filter_index(&rows), filter.filter_index(&rows));
        assert_eq!(indices(&filter, &rows), vec![0, 1, 2]);

        let FilterSpec::Compound { arguments, .. } = spec else {
            panic!("expected compound");
        };
        assert_eq!(
            arguments[0].to_json(),
            json!({"operator": "IN_RANGE", "column": "day", "min_val": "2024-03-01", "max_val": "2024-03-02"})
        );
    }

    #[test]
    fn test_to_spec_round_trip_non_finite_bounds() {
        let schema = Schema::new(vec![Column::new("x", DomainType::Number)]);
        let rows = vec![
            vec![Value::from(-1.0e300)],
            vec![Value::from(3i64)],
            vec![Value::from(f64::NAN)],
        ];
        let raw = json!({
            "operator": "ANY",
            "arguments": [
                {"operator": "IN_RANGE", "column": "x", "min_val": "-inf", "max_val": "inf"},
                {"operator": "IN_LIST", "column": "x", "values": ["nan"]}
            ]
        });
        let filter = DataPlaneFilter::from_json(&raw, &schema).unwrap();
        let spec = filter.to_spec();
        let FilterSpec::Compound { arguments, .. } = &spec else {
            panic!("expected compound");
        };
        assert_eq!(
            arguments[0].to_json(),
            json!({"operator": "IN_RANGE", "column": "x", "min_val": "-inf", "max_val": "inf"})
        );

        let recompiled = DataPlaneFilter::new(&spec, &schema).unwrap();
        assert_eq!(recompiled.filter_index(&rows), filter.filter_index(&rows));
        assert_eq!(indices(&filter, &rows), vec![0, 1, 2]);
    }

    #[test]
    fn test_collect_column_values() {
        let filter = compile(json!({
            "operator": "ALL",
            "arguments": [
                {"operator": "IN_LIST", "column": "name", "values": ["Ted", "Alice"]},
                {"operator": "ANY", "arguments": [
                    {"operator": "REGEX_MATCH", "column": "name", "expression": "J.*"},
                    {"operator": "IN_RANGE", "column": "age", "min_val": 1, "max_val": 2}
                ]}
            ]
        }));
        let names: Vec<Value> = filter.collect_column_values("name").into_iter().collect();
        assert_eq!(
            names,
            vec![Value::from("Alice"), Value::from("J.*"), Value::from("Ted")]
        );
        assert_eq!(filter.collect_column_values("age").len(), 2);
        assert!(filter.collect_column_values("height").is_empty());
        assert_eq!(
            filter.column_names().into_iter().collect::<Vec<_>>(),
            vec!["age", "name"]
        );
    }

    #[test]
    fn test_new_rechecks_constructed_spec() {
        let spec = FilterSpec::in_range("age", json!("a"), json!(1));
        assert!(matches!(
            DataPlaneFilter::new(&spec, &people_schema()),
            Err(InvalidDataError::IncomparableRange { .. })
        ));
    }
}
