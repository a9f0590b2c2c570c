//! Result shape normalization for tabular output.
//!
//! CSV and TSV need rows of records. Commands hand the renderer whatever
//! they produced, so the value is inspected once and classified into a
//! [`Shape`], which then becomes a [`Table`]:
//!
//! - a record whose only non-scalar field is a list of records splits into
//!   a metadata block plus rows
//! - a list of records is the table itself
//! - any other record is a one-row table
//! - everything else is rejected
//!
//! Values can skip inference entirely by declaring their own split through
//! [`Render::declared_split`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;

/// One row: field name to value.
pub type Record = Map<String, Value>;

/// Metadata and rows stated by the value itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredSplit {
    pub metadata: Record,
    pub rows: Vec<Record>,
}

/// Anything a command can hand to the renderer.
///
/// Structured formats serialize the value as-is. Tabular formats first ask
/// for a declared split and fall back to shape inference when there is none.
pub trait Render: Serialize {
    fn declared_split(&self) -> Option<DeclaredSplit> {
        None
    }
}

impl Render for Value {}
impl Render for Record {}
impl<T: Serialize> Render for [T] {}
impl<T: Serialize> Render for Vec<T> {}
impl<V: Serialize> Render for BTreeMap<String, V> {}

impl<T: Render + ?Sized> Render for &T {
    fn declared_split(&self) -> Option<DeclaredSplit> {
        (**self).declared_split()
    }
}

/// Classification of a serialized value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Not record-shaped: bare scalars and lists holding non-records
    Scalar(Value),
    Record(Record),
    RecordSequence(Vec<Record>),
    MetadataRows { metadata: Record, rows: Vec<Record> },
}

impl Shape {
    pub fn classify(value: Value) -> Shape {
        match value {
            Value::Object(map) => classify_record(map),
            Value::Array(items) if items.iter().all(is_record_like) => {
                Shape::RecordSequence(items.into_iter().map(into_record).collect())
            }
            other => Shape::Scalar(other),
        }
    }

    pub fn into_table(self) -> Result<Table, Error> {
        match self {
            Shape::Record(record) => Ok(Table {
                metadata: None,
                rows: vec![record],
            }),
            Shape::RecordSequence(rows) => Ok(Table {
                metadata: None,
                rows,
            }),
            Shape::MetadataRows { metadata, rows } => Ok(Table {
                metadata: Some(metadata).filter(|m| !m.is_empty()),
                rows,
            }),
            Shape::Scalar(value) => Err(Error::Shape(format!(
                "csv/tsv output requires an object or an array of objects, got {}; \
                 use -o json or -o yaml for this command",
                describe(&value)
            ))),
        }
    }
}

/// Normalized tabular view of a render value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub metadata: Option<Record>,
    pub rows: Vec<Record>,
}

impl Table {
    /// Sorted union of field names across all rows. Rows need not share a
    /// field set.
    pub fn headers(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.rows.iter().flat_map(|row| row.keys()).collect();
        set.into_iter().cloned().collect()
    }
}

/// Turn a render value into a table. A declared split takes precedence
/// over shape inference.
pub fn normalize<T: Render + ?Sized>(value: &T) -> Result<Table, Error> {
    if let Some(split) = value.declared_split() {
        return Ok(Table {
            metadata: Some(split.metadata).filter(|m| !m.is_empty()),
            rows: split.rows,
        });
    }
    let tree = serde_json::to_value(value).map_err(|e| Error::serialize("serialize output", e))?;
    Shape::classify(tree).into_table()
}

fn classify_record(map: Record) -> Shape {
    let mut row_fields = map.iter().filter(|(_, v)| is_record_sequence(v));
    let rows_key = match (row_fields.next(), row_fields.next()) {
        (Some((key, _)), None) => key.clone(),
        _ => return Shape::Record(map),
    };
    if !map
        .iter()
        .filter(|(key, _)| **key != rows_key)
        .all(|(_, v)| is_scalar(v))
    {
        return Shape::Record(map);
    }

    let mut metadata = map;
    let rows = match metadata.remove(&rows_key) {
        Some(Value::Array(items)) => items.into_iter().map(into_record).collect(),
        _ => Vec::new(),
    };
    Shape::MetadataRows { metadata, rows }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// `null` entries in a row list read as empty records.
fn is_record_like(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Null)
}

fn is_record_sequence(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().all(is_record_like))
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array containing non-object values",
        Value::Object(_) => "an object",
    }
}
