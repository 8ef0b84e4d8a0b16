//! In-memory transaction table.
//!
//! RULES:
//!   - Input tables are never mutated in place. Every transform returns
//!     a derived table; callers keep the original.
//!   - Cell access is total: a missing cell reads as Null, never a panic.
//!   - Numeric coercion is null-on-failure. A text cell that does not
//!     parse as a number is simply excluded from numeric comparisons.

use crate::{
    error::{EngineError, EngineResult},
    types::RowIx,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ── Cell values ──────────────────────────────────────────────────────────────

/// A single typed cell. Tables are loosely typed: the same column may mix
/// numbers and text in dirty input, and the engine must cope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl Value {
    /// Convert a raw JSON cell into a typed value. ISO-formatted date
    /// strings become Date cells; everything else stays as-is.
    pub fn from_json(raw: &serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Value::Number(f),
                None => Value::Null,
            },
            serde_json::Value::String(s) => Value::parse_cell(s),
            other => Value::Text(other.to_string()),
        }
    }

    /// Parse a text cell, detecting ISO dates (YYYY-MM-DD).
    pub fn parse_cell(s: &str) -> Value {
        if let Ok(d) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Value::Date(d);
        }
        Value::Text(s.to_string())
    }

    /// Numeric view of this cell. Text is parsed per value; unparseable
    /// text, dates, and nulls yield None.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Date(_) | Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Integral customer IDs print without a trailing ".0".
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Null => Ok(()),
        }
    }
}

// ── Table ────────────────────────────────────────────────────────────────────

pub type Row = HashMap<String, Value>;

/// An ordered sequence of rows with a stable column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a table from a JSON array of row objects. The column list is
    /// the union of keys across all rows, in first-occurrence order;
    /// missing cells read as Null.
    pub fn from_records(records: &serde_json::Value) -> EngineResult<Table> {
        let array = records.as_array().ok_or_else(|| {
            EngineError::Other(anyhow::anyhow!("table input must be a JSON array of objects"))
        })?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Row> = Vec::with_capacity(array.len());

        for (ix, record) in array.iter().enumerate() {
            let obj = record.as_object().ok_or_else(|| {
                EngineError::Other(anyhow::anyhow!("table row {ix} is not a JSON object"))
            })?;
            let mut row = Row::with_capacity(obj.len());
            for (key, raw) in obj {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
                row.insert(key.clone(), Value::from_json(raw));
            }
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Reject schema-corrupt tables: every listed column must exist.
    pub fn require_columns(&self, required: &[&str]) -> EngineResult<()> {
        for &col in required {
            if !self.has_column(col) {
                return Err(EngineError::MissingColumn {
                    column: col.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Total cell access: Null for absent cells.
    pub fn get(&self, row: RowIx, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL)
    }

    /// Bulk column view in row order, one entry per row.
    pub fn column(&self, name: &str) -> Vec<&Value> {
        static NULL: Value = Value::Null;
        self.rows
            .iter()
            .map(|r| r.get(name).unwrap_or(&NULL))
            .collect()
    }

    /// Contiguous row shard [start, end). Bounds are clamped.
    pub fn slice(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        Table {
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Derived table with one column replaced or appended. Row count is
    /// preserved; `values` must be row-aligned.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> EngineResult<Table> {
        if values.len() != self.rows.len() {
            return Err(EngineError::Other(anyhow::anyhow!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        let mut columns = self.columns.clone();
        if !self.has_column(name) {
            columns.push(name.to_string());
        }
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(r, v)| {
                let mut row = r.clone();
                row.insert(name.to_string(), v);
                row
            })
            .collect();
        Ok(Table { columns, rows })
    }

    /// Stitch row shards back together in shard order.
    pub fn concat(columns: Vec<String>, shards: Vec<Table>) -> Table {
        let rows = shards.into_iter().flat_map(|s| s.rows).collect();
        Table { columns, rows }
    }

    /// Serialize as a JSON array of row objects, cells in column order.
    pub fn to_json_records(&self) -> serde_json::Value {
        let records: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::with_capacity(self.columns.len());
                for col in &self.columns {
                    let cell = row.get(col).unwrap_or(&Value::Null);
                    obj.insert(
                        col.clone(),
                        serde_json::to_value(cell).unwrap_or(serde_json::Value::Null),
                    );
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}
