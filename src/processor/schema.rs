use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::processor::{EngineError, Result};

/// Physical column type as named in the dataset header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Uint8,
    Uint16,
    Uint32,
    Float32,
    /// Fixed-length byte run
    String,
    /// Fixed-length byte run holding a date as text
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int8 => "Int8",
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Uint8 => "Uint8",
            ColumnType::Uint16 => "Uint16",
            ColumnType::Uint32 => "Uint32",
            ColumnType::Float32 => "Float32",
            ColumnType::String => "string",
            ColumnType::Date => "date",
        }
    }

    /// Byte width for numeric types; `None` for byte runs, whose width is per column.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Int8 | ColumnType::Uint8 => Some(1),
            ColumnType::Int16 | ColumnType::Uint16 => Some(2),
            ColumnType::Int32 | ColumnType::Uint32 | ColumnType::Float32 => Some(4),
            ColumnType::String | ColumnType::Date => None,
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Date)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, ColumnType::Uint8 | ColumnType::Uint16 | ColumnType::Uint32)
    }

    /// Inclusive integer range representable by the type, if it is an integer type.
    pub fn int_range(&self) -> Option<(i64, i64)> {
        match self {
            ColumnType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            ColumnType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            ColumnType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            ColumnType::Uint8 => Some((0, u8::MAX as i64)),
            ColumnType::Uint16 => Some((0, u16::MAX as i64)),
            ColumnType::Uint32 => Some((0, u32::MAX as i64)),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Int8" => Ok(ColumnType::Int8),
            "Int16" => Ok(ColumnType::Int16),
            "Int32" => Ok(ColumnType::Int32),
            "Uint8" => Ok(ColumnType::Uint8),
            "Uint16" => Ok(ColumnType::Uint16),
            "Uint32" => Ok(ColumnType::Uint32),
            "Float32" => Ok(ColumnType::Float32),
            "string" => Ok(ColumnType::String),
            "date" => Ok(ColumnType::Date),
            other => Err(EngineError::UnknownColumnType(other.to_string())),
        }
    }
}

/// One column of a packed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub size: usize,
    pub offset: usize,
}

impl ColumnDescriptor {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Column entry of the JSON header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    #[serde(rename = "type")]
    pub column_type: String,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// JSON document stored after the header-length prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHeader {
    pub columns: BTreeMap<String, ColumnHeader>,
    pub column_order: Vec<String>,
    #[serde(default)]
    pub column_order_original: Vec<String>,
    pub count: u32,
    #[serde(default)]
    pub row_size: Option<u32>,
}

/// Validated row layout: ordered columns, offsets and row size
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
    column_order_original: Vec<String>,
    row_count: u32,
    row_size: usize,
}

pub(crate) fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

impl Schema {
    /// Builds a schema from descriptors laid out by the caller.
    ///
    /// Offsets must be monotonic and non-overlapping, numeric columns must
    /// have their type's width, and `row_size` must be a multiple of 4 that
    /// covers every column.
    pub fn new(columns: Vec<ColumnDescriptor>, row_size: usize, row_count: u32) -> Result<Self> {
        let mut cursor = 0usize;
        let mut index = HashMap::with_capacity(columns.len());

        for (i, col) in columns.iter().enumerate() {
            if let Some(width) = col.column_type.fixed_width() {
                if col.size != width {
                    return Err(EngineError::Schema(format!(
                        "column {} of type {} has size {}, expected {}",
                        col.name, col.column_type, col.size, width
                    )));
                }
            }
            if col.offset < cursor {
                return Err(EngineError::Schema(format!(
                    "column {} at offset {} overlaps previous column ending at {}",
                    col.name, col.offset, cursor
                )));
            }
            if index.insert(col.name.clone(), i).is_some() {
                return Err(EngineError::Schema(format!("duplicate column {}", col.name)));
            }
            cursor = col.end();
        }

        if row_size % 4 != 0 {
            return Err(EngineError::Schema(format!(
                "row size {row_size} is not 4-byte aligned"
            )));
        }
        if row_size < cursor {
            return Err(EngineError::Schema(format!(
                "row size {row_size} smaller than column extent {cursor}"
            )));
        }

        let column_order_original = columns.iter().map(|c| c.name.clone()).collect();
        Ok(Self {
            columns,
            index,
            column_order_original,
            row_count,
            row_size,
        })
    }

    /// Validates a parsed header. Offsets missing from the header are packed
    /// in column order; a missing row size is the 4-byte-rounded extent.
    pub fn from_header(header: &DatasetHeader) -> Result<Self> {
        let mut columns = Vec::with_capacity(header.column_order.len());
        let mut cursor = 0usize;

        for name in &header.column_order {
            let col = header.columns.get(name).ok_or_else(|| {
                EngineError::Schema(format!("column {name} listed in columnOrder but not described"))
            })?;
            let column_type: ColumnType = col.column_type.parse()?;
            let offset = col.offset.map_or(cursor, |o| o as usize);
            let size = col.size as usize;
            columns.push(ColumnDescriptor {
                name: name.clone(),
                column_type,
                size,
                offset,
            });
            cursor = offset + size;
        }

        let row_size = header
            .row_size
            .map_or_else(|| round_up4(cursor), |r| r as usize);

        let mut schema = Self::new(columns, row_size, header.count)?;
        if !header.column_order_original.is_empty() {
            schema.column_order_original = header.column_order_original.clone();
        }
        Ok(schema)
    }

    pub fn to_header(&self) -> DatasetHeader {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ColumnHeader {
                        column_type: c.column_type.as_str().to_string(),
                        size: c.size as u32,
                        offset: Some(c.offset as u32),
                    },
                )
            })
            .collect();

        DatasetHeader {
            columns,
            column_order: self.columns.iter().map(|c| c.name.clone()).collect(),
            column_order_original: self.column_order_original.clone(),
            count: self.row_count,
            row_size: Some(self.row_size as u32),
        }
    }

    pub fn with_row_count(mut self, row_count: u32) -> Self {
        self.row_count = row_count;
        self
    }

    pub(crate) fn with_original_order(mut self, order: Vec<String>) -> Self {
        self.column_order_original = order;
        self
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn require(&self, name: &str) -> Result<&ColumnDescriptor> {
        self.column(name)
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column_order_original(&self) -> &[String] {
        &self.column_order_original
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column names of the `byRoute` result schema
pub const INSTANCES_COLUMN: &str = "Instances";

/// Result layout for `byRoute`: the two code columns, then `Instances`, then
/// one `Uint32` total per measure. Every numeric field is word aligned so it
/// can be accumulated atomically.
pub fn route_schema(
    origin: &ColumnDescriptor,
    destination: &ColumnDescriptor,
    measures: &[&str],
) -> Result<Schema> {
    let mut columns = vec![
        ColumnDescriptor {
            name: origin.name.clone(),
            column_type: origin.column_type,
            size: origin.size,
            offset: 0,
        },
        ColumnDescriptor {
            name: destination.name.clone(),
            column_type: destination.column_type,
            size: destination.size,
            offset: origin.size,
        },
    ];

    let mut cursor = round_up4(origin.size + destination.size);
    for name in std::iter::once(INSTANCES_COLUMN).chain(measures.iter().copied()) {
        columns.push(ColumnDescriptor {
            name: name.to_string(),
            column_type: ColumnType::Uint32,
            size: 4,
            offset: cursor,
        });
        cursor += 4;
    }

    Schema::new(columns, cursor, 0)
}

/// Byte size of one `WebGL` result record
pub const WEBGL_RECORD_SIZE: usize = 24;

/// Result layout for `WebGL`: origin lon/lat, destination lon/lat as
/// `Float32`, then weight and length as `Uint32`.
pub fn webgl_schema() -> Schema {
    let fields = [
        ("Origin_long", ColumnType::Float32),
        ("Origin_lat", ColumnType::Float32),
        ("Destination_long", ColumnType::Float32),
        ("Destination_lat", ColumnType::Float32),
        ("Weight", ColumnType::Uint32),
        ("Length", ColumnType::Uint32),
    ];
    let columns = fields
        .iter()
        .enumerate()
        .map(|(i, (name, column_type))| ColumnDescriptor {
            name: name.to_string(),
            column_type: *column_type,
            size: 4,
            offset: i * 4,
        })
        .collect();

    Schema {
        index: fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.to_string(), i))
            .collect(),
        column_order_original: fields.iter().map(|(name, _)| name.to_string()).collect(),
        columns,
        row_count: 0,
        row_size: WEBGL_RECORD_SIZE,
    }
}
