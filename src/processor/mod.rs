use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod byte_string;
pub mod codec;
pub mod config;
pub mod data_manager;
pub mod dataset;
pub mod hash_table;
pub mod ingest;
pub mod region;
pub mod scan_state;
pub mod schema;
pub mod worker;

use schema::ColumnType;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown column type: {0}")]
    UnknownColumnType(String),

    #[error("Row payload truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Operator {op} cannot be applied to column {column} of type {column_type}")]
    FilterTypeMismatch {
        column: String,
        op: FilterOp,
        column_type: ColumnType,
    },

    #[error("Invalid filter value {value:?} for column {column}")]
    InvalidFilterValue { column: String, value: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Owned cell value, materialized when a caller needs a snapshot of a row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any integer column
    Int(i64),
    /// Float32 column, widened
    Float(f64),
    /// Fixed-width string or date column, exact slot bytes
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bytes(_) => None,
        }
    }

    /// Text of a byte column with its zero padding removed.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Bytes(b) => Some(String::from_utf8_lossy(trim_padding(b))),
            _ => None,
        }
    }

    pub fn text(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(trim_padding(b))),
        }
    }
}

pub(crate) fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &bytes[..end]
}

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    /// Case-insensitive substring match (string/date columns only)
    Contains,
    Equal,
    NotEqual,
    /// Strictly greater (numeric columns only)
    MoreThan,
    /// Strictly less (numeric columns only)
    LessThan,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Contains => "contains",
            FilterOp::Equal => "equal",
            FilterOp::NotEqual => "notEqual",
            FilterOp::MoreThan => "moreThan",
            FilterOp::LessThan => "lessThan",
        }
    }

    /// Whether the operator is defined for a column of this type.
    pub fn supports(&self, column_type: ColumnType) -> bool {
        match self {
            FilterOp::Contains => column_type.is_bytes(),
            FilterOp::MoreThan | FilterOp::LessThan => !column_type.is_bytes(),
            FilterOp::Equal | FilterOp::NotEqual => true,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contains" => Ok(FilterOp::Contains),
            "equal" => Ok(FilterOp::Equal),
            "notEqual" => Ok(FilterOp::NotEqual),
            "moreThan" => Ok(FilterOp::MoreThan),
            "lessThan" => Ok(FilterOp::LessThan),
            other => Err(EngineError::InvalidQuery(format!("unknown operator {other:?}"))),
        }
    }
}

/// Right-hand side of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

/// A single-predicate filter: `column op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    #[serde(rename = "operation")]
    pub op: FilterOp,
    pub value: FilterValue,
}

impl FilterSpec {
    pub fn new(column: &str, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    pub fn text(column: &str, op: FilterOp, value: &str) -> Self {
        Self::new(column, op, FilterValue::Text(value.to_string()))
    }

    pub fn number(column: &str, op: FilterOp, value: f64) -> Self {
        Self::new(column, op, FilterValue::Number(value))
    }

    /// Builds a filter from UI text: operator wire name plus raw value text.
    ///
    /// The value stays text here; numeric columns parse it when the filter is
    /// compiled against the schema.
    pub fn parse(column: &str, op: &str, raw: &str) -> Result<Self> {
        Ok(Self::text(column, op.parse()?, raw))
    }
}

/// How matching rows are written to the result region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AggregationMode {
    /// Copy matching rows verbatim
    #[default]
    #[serde(rename = "none")]
    None,
    /// Group by route key, summing counts
    #[serde(rename = "byRoute")]
    ByRoute,
    /// Group by route key into fixed 24-byte render records
    #[serde(rename = "WebGL")]
    WebGl,
}

impl FromStr for AggregationMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(AggregationMode::None),
            "byRoute" => Ok(AggregationMode::ByRoute),
            "WebGL" | "webgl" => Ok(AggregationMode::WebGl),
            other => Err(EngineError::InvalidQuery(format!(
                "unknown aggregation mode {other:?}"
            ))),
        }
    }
}
